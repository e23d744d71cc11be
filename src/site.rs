//! The environment a script runs against.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::ScriptError;
use crate::logging::ScriptOutcome;
use crate::value::Value;

/// Attribution used when no identity claim is available.
pub const ANONYMOUS: &str = "anonymous";

/// A sub-execution started on behalf of a running script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildScript {
    /// Id recorded in the parent's `children`.
    pub id: String,
    /// Outcome of the child as known when the call returned.
    pub outcome: ScriptOutcome,
}

/// Presets and services supplied to a running script.
///
/// Only [`ScriptSite::presets`] is required; services default to failing
/// with [`ScriptError::Site`].
#[async_trait]
pub trait ScriptSite: Send + Sync {
    /// Input values bound in the root scope before the first block runs.
    fn presets(&self) -> HashMap<String, Value>;

    /// Invoke a named environment service.
    async fn call(&self, service: &str, _args: Vec<Value>) -> Result<Value, ScriptError> {
        Err(ScriptError::Site(format!("Unknown service '{}'", service)))
    }

    /// Start another script as a child of the current one.
    async fn spawn_child(
        &self,
        name: &str,
        _presets: HashMap<String, Value>,
    ) -> Result<ChildScript, ScriptError> {
        Err(ScriptError::Site(format!(
            "Sub-scripts are not supported by this site ('{}')",
            name
        )))
    }
}

/// Source of the identity a run is attributed to.
pub trait CurrentUser: Send + Sync {
    /// Identity claim of the current user, if any.
    fn identity(&self) -> Option<String>;
}

/// Attribution string for `user`, falling back to [`ANONYMOUS`].
pub fn attribution(user: Option<&dyn CurrentUser>) -> String {
    user.and_then(|u| u.identity())
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| ANONYMOUS.to_string())
}

/// A fixed identity.
#[derive(Debug, Clone)]
pub struct NamedUser(pub String);

impl CurrentUser for NamedUser {
    fn identity(&self) -> Option<String> {
        Some(self.0.clone())
    }
}

type Service = Arc<dyn Fn(&[Value]) -> Result<Value, ScriptError> + Send + Sync>;

/// In-memory site with fixed presets and synchronous services.
///
/// # Example
///
/// ```rust
/// use blockflow::{StaticSite, Value};
///
/// let site = StaticSite::new()
///     .with_preset("limit", Value::from(10))
///     .with_service("echo", |args| Ok(args.first().cloned().unwrap_or_default()));
/// ```
#[derive(Default, Clone)]
pub struct StaticSite {
    presets: HashMap<String, Value>,
    services: HashMap<String, Service>,
}

impl fmt::Debug for StaticSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticSite")
            .field("presets", &self.presets)
            .field("services", &self.services.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl StaticSite {
    /// Create a site with no presets and no services.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a preset.
    pub fn with_preset(mut self, name: impl Into<String>, value: Value) -> Self {
        self.presets.insert(name.into(), value);
        self
    }

    /// Add a service.
    pub fn with_service<F>(mut self, name: impl Into<String>, service: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, ScriptError> + Send + Sync + 'static,
    {
        self.services.insert(name.into(), Arc::new(service));
        self
    }
}

#[async_trait]
impl ScriptSite for StaticSite {
    fn presets(&self) -> HashMap<String, Value> {
        self.presets.clone()
    }

    async fn call(&self, service: &str, args: Vec<Value>) -> Result<Value, ScriptError> {
        match self.services.get(service) {
            Some(service) => service(&args),
            None => Err(ScriptError::Site(format!("Unknown service '{}'", service))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoClaim;

    impl CurrentUser for NoClaim {
        fn identity(&self) -> Option<String> {
            None
        }
    }

    #[test]
    fn test_attribution_falls_back_to_anonymous() {
        assert_eq!(attribution(None), "anonymous");
        assert_eq!(attribution(Some(&NoClaim)), "anonymous");
        assert_eq!(attribution(Some(&NamedUser(String::new()))), "anonymous");
        assert_eq!(attribution(Some(&NamedUser("bob".to_string()))), "bob");
    }

    struct PresetsOnly;

    #[async_trait]
    impl ScriptSite for PresetsOnly {
        fn presets(&self) -> HashMap<String, Value> {
            HashMap::from([("limit".to_string(), Value::from(3))])
        }
    }

    #[tokio::test]
    async fn test_default_services_report_site_errors() {
        let site = PresetsOnly;
        assert_eq!(site.presets().get("limit"), Some(&Value::from(3)));
        assert!(matches!(
            site.call("lookup", vec![Value::from(1)]).await,
            Err(ScriptError::Site(message)) if message.contains("lookup")
        ));
        assert!(matches!(
            site.spawn_child("nightly", HashMap::new()).await,
            Err(ScriptError::Site(message)) if message.contains("nightly")
        ));
    }

    #[tokio::test]
    async fn test_static_site_services() {
        let site = StaticSite::new().with_service("sum", |args| {
            let mut total = 0.0;
            for arg in args {
                total += arg.as_number()?;
            }
            Ok(Value::Number(total))
        });
        let result = site
            .call("sum", vec![Value::from(1), Value::from(2)])
            .await
            .unwrap();
        assert_eq!(result, Value::Number(3.0));
        assert!(matches!(
            site.call("missing", vec![]).await,
            Err(ScriptError::Site(_))
        ));
    }
}
