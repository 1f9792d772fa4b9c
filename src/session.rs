//! Bearer token and device identity for the Geo account.
//!
//! Re-authentication is a two-step transaction: log in, then resolve the
//! device using the token that login just returned. The stored credential and
//! identity are replaced together, and only when both steps succeed.

use crate::error::{AuthError, DeviceResolutionError, SessionError};
use crate::geohome_api::{DeviceDetails, GeoApi};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

#[derive(Clone)]
pub struct Credential {
    token: String,
    issued_at: Instant,
}

impl Credential {
    pub fn new(token: String, issued_at: Instant) -> Self {
        Self { token, issued_at }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn issued_at(&self) -> Instant {
        self.issued_at
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"<redacted>")
            .field("issued_at", &self.issued_at)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub device_id: String,
    pub device_name: String,
    pub device_type: Option<String>,
}

impl DeviceIdentity {
    /// Picks the first system on the account.
    pub fn from_details(details: &DeviceDetails) -> Option<Self> {
        let role = details.system_roles.first()?;
        let device_name = role
            .name
            .clone()
            .or_else(|| details.system_details.iter().find_map(|d| d.name.clone()))
            .unwrap_or_else(|| role.system_id.clone());
        let device_type = details
            .system_details
            .iter()
            .flat_map(|d| d.devices.iter())
            .find_map(|d| match d.device_type.as_ref()? {
                serde_json::Value::String(s) => Some(s.clone()),
                serde_json::Value::Null => None,
                other => Some(other.to_string()),
            });

        Some(Self {
            device_id: role.system_id.clone(),
            device_name,
            device_type,
        })
    }
}

/// Whether `interval` has fully elapsed since `last`. Unset means due.
pub fn is_due(now: Instant, last: Option<Instant>, interval: Duration) -> bool {
    match last {
        Some(last) => now.saturating_duration_since(last) >= interval,
        None => true,
    }
}

pub struct SessionManager {
    username: String,
    password: String,
    credential: Option<Credential>,
    device: Option<DeviceIdentity>,
}

impl SessionManager {
    pub fn new(username: String, password: String) -> Self {
        Self {
            username,
            password,
            credential: None,
            device: None,
        }
    }

    pub fn credential(&self) -> Option<&Credential> {
        self.credential.as_ref()
    }

    pub fn device(&self) -> Option<&DeviceIdentity> {
        self.device.as_ref()
    }

    /// Token and device, if both are usable for data fetches.
    pub fn active(&self) -> Option<(&Credential, &DeviceIdentity)> {
        Some((self.credential.as_ref()?, self.device.as_ref()?))
    }

    /// Auth is due once `auth_interval` has elapsed, or whenever no
    /// credential is held.
    pub fn is_auth_due(
        &self,
        now: Instant,
        last_auth_at: Option<Instant>,
        auth_interval: Duration,
    ) -> bool {
        self.credential.is_none() || is_due(now, last_auth_at, auth_interval)
    }

    pub async fn authenticate<A: GeoApi + ?Sized>(
        &self,
        api: &A,
        now: Instant,
    ) -> Result<Credential, AuthError> {
        let token = api
            .login(&self.username, &self.password)
            .await
            .map_err(AuthError)?;
        Ok(Credential::new(token, now))
    }

    pub async fn resolve_device<A: GeoApi + ?Sized>(
        &self,
        api: &A,
        credential: &Credential,
    ) -> Result<DeviceIdentity, DeviceResolutionError> {
        let details = api
            .device_details(credential.token())
            .await
            .map_err(DeviceResolutionError::Api)?;
        DeviceIdentity::from_details(&details).ok_or(DeviceResolutionError::NoSystem)
    }

    /// Logs in and resolves the device with the new token.
    ///
    /// On failure the previous credential and device are left in place.
    pub async fn refresh<A: GeoApi + ?Sized>(
        &mut self,
        api: &A,
        now: Instant,
    ) -> Result<&DeviceIdentity, SessionError> {
        let credential = self.authenticate(api, now).await?;
        let device = self.resolve_device(api, &credential).await?;

        if self
            .device
            .as_ref()
            .is_some_and(|old| old.device_id != device.device_id)
        {
            warn!(
                "Device changed on re-authentication, now using {}",
                device.device_id
            );
        }
        info!(
            "Authenticated, device {} ({}) type {}",
            device.device_id,
            device.device_name,
            device.device_type.as_deref().unwrap_or("unknown")
        );

        self.credential = Some(credential);
        Ok(&*self.device.insert(device))
    }

    /// Drops the credential after the API refused it.
    pub fn invalidate(&mut self) {
        if self.credential.take().is_some() {
            warn!("Credential rejected by the API, re-authenticating on next tick");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApiError;
    use crate::geohome_api::{LiveData, PeriodicData, SystemDetail, SystemRole};
    use serde_json::json;
    use std::sync::Mutex;

    /// Hands out numbered tokens and records which token each lookup used.
    #[derive(Default)]
    struct FakeApi {
        logins: Mutex<u32>,
        fail_login: bool,
        fail_details: bool,
        no_system: bool,
        details_tokens: Mutex<Vec<String>>,
        system_id: Mutex<String>,
    }

    #[async_trait::async_trait]
    impl GeoApi for FakeApi {
        async fn login(&self, _username: &str, _password: &str) -> Result<String, ApiError> {
            if self.fail_login {
                return Err(ApiError::Status(500));
            }
            let mut logins = self.logins.lock().unwrap();
            *logins += 1;
            Ok(format!("token-{}", *logins))
        }

        async fn device_details(&self, token: &str) -> Result<DeviceDetails, ApiError> {
            self.details_tokens.lock().unwrap().push(token.to_string());
            if self.fail_details {
                return Err(ApiError::Transport("connection reset".into()));
            }
            if self.no_system {
                return Ok(DeviceDetails::default());
            }
            Ok(DeviceDetails {
                system_roles: vec![SystemRole {
                    system_id: self.system_id.lock().unwrap().clone(),
                    name: None,
                }],
                system_details: vec![],
            })
        }

        async fn live_data(&self, _: &str, _: &str) -> Result<LiveData, ApiError> {
            unimplemented!()
        }

        async fn periodic_data(&self, _: &str, _: &str) -> Result<PeriodicData, ApiError> {
            unimplemented!()
        }
    }

    fn fake(system_id: &str) -> FakeApi {
        let api = FakeApi::default();
        *api.system_id.lock().unwrap() = system_id.to_string();
        api
    }

    #[test]
    fn test_auth_due_boundary_is_inclusive() {
        let mut session = SessionManager::new("u".into(), "p".into());
        session.credential = Some(Credential::new("t".into(), Instant::now()));

        let last = Instant::now();
        let interval = Duration::from_secs(100);
        assert!(!session.is_auth_due(last + Duration::from_secs(99), Some(last), interval));
        assert!(session.is_auth_due(last + Duration::from_secs(100), Some(last), interval));
        assert!(session.is_auth_due(last + Duration::from_secs(101), Some(last), interval));
    }

    #[test]
    fn test_auth_due_without_credential() {
        let session = SessionManager::new("u".into(), "p".into());
        let now = Instant::now();
        assert!(session.is_auth_due(now, Some(now), Duration::from_secs(100)));
        assert!(is_due(now, None, Duration::from_secs(100)));
    }

    #[tokio::test]
    async fn test_refresh_resolves_with_new_token() {
        let api = fake("sys-1");
        let mut session = SessionManager::new("u".into(), "p".into());
        let now = Instant::now();

        session.refresh(&api, now).await.unwrap();
        session.refresh(&api, now).await.unwrap();

        assert_eq!(
            *api.details_tokens.lock().unwrap(),
            vec!["token-1".to_string(), "token-2".to_string()]
        );
        let (credential, device) = session.active().unwrap();
        assert_eq!(credential.token(), "token-2");
        assert_eq!(device.device_id, "sys-1");
        assert_eq!(device.device_name, "sys-1");
    }

    #[tokio::test]
    async fn test_failed_resolution_keeps_previous_session() {
        let mut api = fake("sys-1");
        let mut session = SessionManager::new("u".into(), "p".into());
        session.refresh(&api, Instant::now()).await.unwrap();

        api.fail_details = true;
        let result = session.refresh(&api, Instant::now()).await;

        assert!(matches!(result, Err(SessionError::DeviceResolution(_))));
        let (credential, device) = session.active().unwrap();
        assert_eq!(credential.token(), "token-1");
        assert_eq!(device.device_id, "sys-1");
    }

    #[tokio::test]
    async fn test_failed_login_skips_device_lookup() {
        let mut api = fake("sys-1");
        api.fail_login = true;
        let mut session = SessionManager::new("u".into(), "p".into());

        let result = session.refresh(&api, Instant::now()).await;

        assert_eq!(
            result.unwrap_err(),
            SessionError::Auth(AuthError(ApiError::Status(500)))
        );
        assert!(api.details_tokens.lock().unwrap().is_empty());
        assert!(session.active().is_none());
    }

    #[tokio::test]
    async fn test_account_without_system() {
        let mut api = fake("sys-1");
        api.no_system = true;
        let session = SessionManager::new("u".into(), "p".into());
        let credential = Credential::new("t".into(), Instant::now());

        let result = session.resolve_device(&api, &credential).await;

        assert_eq!(result, Err(DeviceResolutionError::NoSystem));
    }

    #[test]
    fn test_identity_from_details() {
        let details = DeviceDetails {
            system_roles: vec![SystemRole {
                system_id: "sys-9".into(),
                name: None,
            }],
            system_details: vec![SystemDetail {
                name: Some("Flat".into()),
                devices: vec![
                    Default::default(),
                    crate::geohome_api::DeviceEntry {
                        device_type: Some(json!(42)),
                    },
                ],
            }],
        };

        let identity = DeviceIdentity::from_details(&details).unwrap();
        assert_eq!(identity.device_id, "sys-9");
        assert_eq!(identity.device_name, "Flat");
        assert_eq!(identity.device_type.as_deref(), Some("42"));
    }

    #[test]
    fn test_invalidate_drops_only_credential() {
        let mut session = SessionManager::new("u".into(), "p".into());
        session.credential = Some(Credential::new("t".into(), Instant::now()));
        session.device = Some(DeviceIdentity {
            device_id: "sys-1".into(),
            device_name: "Home".into(),
            device_type: None,
        });

        session.invalidate();

        assert!(session.credential().is_none());
        assert!(session.active().is_none());
        assert_eq!(session.device().unwrap().device_id, "sys-1");
    }

    #[test]
    fn test_credential_debug_hides_token() {
        let credential = Credential::new("secret-token".into(), Instant::now());
        assert!(!format!("{credential:?}").contains("secret-token"));
    }
}
