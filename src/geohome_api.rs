use crate::error::ApiError;
use crate::extract::{Category, Reading};
use reqwest::StatusCode;
use serde::de::{DeserializeOwned, Deserializer};
use serde::Deserialize as _;
use serde_derive::{Deserialize, Serialize};

pub const DEFAULT_BASE_URL: &str = "https://api.geotogether.com";

const LOGIN_PATH: &str = "usersservice/v2/login";
const DEVICE_DETAILS_PATH: &str = "api/userapi/v2/user/detail-systems?systemDetails=true";
const LIVE_DATA_PATH: &str = "api/userapi/system/smets2-live-data";
const PERIODIC_DATA_PATH: &str = "api/userapi/system/smets2-periodic-data";

/// The calls the bridge makes against the Geo cloud.
#[async_trait::async_trait]
pub trait GeoApi: Send + Sync {
    /// Logs in and returns a bearer token.
    async fn login(&self, username: &str, password: &str) -> Result<String, ApiError>;
    async fn device_details(&self, token: &str) -> Result<DeviceDetails, ApiError>;
    async fn live_data(&self, token: &str, device_id: &str) -> Result<LiveData, ApiError>;
    async fn periodic_data(&self, token: &str, device_id: &str)
        -> Result<PeriodicData, ApiError>;
}

pub struct GeoHomeClient {
    endpoint_url: String,
    client: reqwest::Client,
}

impl Default for GeoHomeClient {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

impl GeoHomeClient {
    pub fn new(endpoint_url: &str) -> Self {
        Self {
            endpoint_url: endpoint_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.endpoint_url, path)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, token: &str) -> Result<T, ApiError> {
        let response = self
            .client
            .get(self.url(path))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        decode(response).await
    }
}

/// Decodes a data response. Anything but 200 is an error.
async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ApiError> {
    decode_if(response, |status| status == StatusCode::OK).await
}

async fn decode_if<T: DeserializeOwned>(
    response: reqwest::Response,
    accepted: impl Fn(StatusCode) -> bool,
) -> Result<T, ApiError> {
    let status = response.status();
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(ApiError::Unauthorized(status.as_u16()));
    }
    if !accepted(status) {
        return Err(ApiError::Status(status.as_u16()));
    }
    response
        .json()
        .await
        .map_err(|e| ApiError::Decode(e.to_string()))
}

#[async_trait::async_trait]
impl GeoApi for GeoHomeClient {
    async fn login(&self, username: &str, password: &str) -> Result<String, ApiError> {
        let response = self
            .client
            .post(self.url(LOGIN_PATH))
            .json(&LoginRequest {
                identity: username,
                password,
            })
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        // Any 2xx is a successful login
        let login: LoginResponse = decode_if(response, |status| status.is_success()).await?;
        Ok(login.access_token)
    }

    async fn device_details(&self, token: &str) -> Result<DeviceDetails, ApiError> {
        self.get_json(DEVICE_DETAILS_PATH, token).await
    }

    async fn live_data(&self, token: &str, device_id: &str) -> Result<LiveData, ApiError> {
        self.get_json(&format!("{LIVE_DATA_PATH}/{device_id}"), token)
            .await
    }

    async fn periodic_data(
        &self,
        token: &str,
        device_id: &str,
    ) -> Result<PeriodicData, ApiError> {
        self.get_json(&format!("{PERIODIC_DATA_PATH}/{device_id}"), token)
            .await
    }
}

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    identity: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    access_token: String,
}

// The Geo API is loose about its payloads: lists come back as `null`, values
// as strings or `null`. A bad field reads as absent and a bad list entry is
// skipped, so one broken commodity never hides another.

fn lenient_list<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let items = match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Array(items) => items,
        _ => return Ok(Vec::new()),
    };
    Ok(items
        .into_iter()
        .filter_map(|item| serde_json::from_value(item).ok())
        .collect())
}

fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok().filter(|v: &f64| v.is_finite()),
        _ => None,
    })
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Some(s),
        _ => None,
    })
}

#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceDetails {
    #[serde(default, deserialize_with = "lenient_list")]
    pub system_roles: Vec<SystemRole>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub system_details: Vec<SystemDetail>,
}

#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemRole {
    pub system_id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: Option<String>,
}

#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemDetail {
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub devices: Vec<DeviceEntry>,
}

#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceEntry {
    // Numeric on some accounts, a string on others
    #[serde(default)]
    pub device_type: Option<serde_json::Value>,
}

#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveData {
    #[serde(default, deserialize_with = "lenient_list")]
    pub power: Vec<PowerEntry>,
}

#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerEntry {
    #[serde(rename = "type", default, deserialize_with = "lenient_string")]
    pub kind: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub watts: Option<f64>,
}

#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodicData {
    #[serde(default, deserialize_with = "lenient_list")]
    pub total_consumption_list: Vec<ConsumptionEntry>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub active_tariff_list: Vec<TariffEntry>,
}

#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumptionEntry {
    #[serde(default, deserialize_with = "lenient_string")]
    pub commodity_type: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub total_consumption: Option<f64>,
}

#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TariffEntry {
    #[serde(default, deserialize_with = "lenient_string")]
    pub commodity_type: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub active_tariff_price: Option<f64>,
}

impl Reading for PowerEntry {
    fn category(&self) -> Option<Category> {
        self.kind.as_deref().and_then(Category::from_wire)
    }
    fn value(&self) -> Option<f64> {
        self.watts
    }
}

impl Reading for ConsumptionEntry {
    fn category(&self) -> Option<Category> {
        self.commodity_type.as_deref().and_then(Category::from_wire)
    }
    fn value(&self) -> Option<f64> {
        self.total_consumption
    }
}

impl Reading for TariffEntry {
    fn category(&self) -> Option<Category> {
        self.commodity_type.as_deref().and_then(Category::from_wire)
    }
    fn value(&self) -> Option<f64> {
        self.active_tariff_price
    }
}
