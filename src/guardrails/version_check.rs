//! Advisory compatibility check between this client and the guardrails container.
//!
//! The container advertises the client versions it accepts; this crate pins the
//! container versions it understands. A mismatch is only ever logged.

use std::str::FromStr;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use http::HeaderMap;
use opentelemetry::KeyValue;
use opentelemetry::trace::SpanRef;
use pep440_rs::{Version, VersionSpecifiers};
use thiserror::Error;
use tracing::{debug, warn};

/// Version of the evaluate API this client speaks.
pub const CLIENT_VERSION: &str = "2.0.1";
/// Container versions this client understands.
pub const CONTAINER_VERSION_CONSTRAINT: &str = ">=1.0.23, <3.0.0";
pub const VERSION_HEADERS: [&str; 2] = ["x-wls-version", "whylabssecureheaders.version"];
pub const CONSTRAINT_HEADERS: [&str; 2] = [
    "x-wls-verconstr",
    "whylabssecureheaders.client_version_constraint",
];
pub const SERVER_START_HEADER: &str = "x-wls-sst";
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(600);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VersionError {
    #[error("invalid version specifier {raw:?}: {reason}")]
    Specifiers { raw: String, reason: String },
    #[error("invalid version {raw:?}: {reason}")]
    Version { raw: String, reason: String },
}

/// Whether `version` satisfies a PEP 440 specifier list such as `>=1.0.23, <3.0.0`.
pub fn satisfies(constraint: &str, version: &str) -> Result<bool, VersionError> {
    let specifiers =
        VersionSpecifiers::from_str(constraint).map_err(|err| VersionError::Specifiers {
            raw: constraint.to_string(),
            reason: err.to_string(),
        })?;
    let version = Version::from_str(version.trim()).map_err(|err| VersionError::Version {
        raw: version.to_string(),
        reason: err.to_string(),
    })?;
    Ok(specifiers.contains(&version))
}

/// Outcome of one compatibility check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compatibility {
    Compatible,
    Incompatible,
    Unknown,
    /// The check interval has not elapsed yet.
    Skipped,
}

/// Version headers read off one evaluator response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionHeaders {
    pub client_constraint: Option<String>,
    pub container_version: Option<String>,
    pub server_start: Option<String>,
}

fn first_header(headers: &HeaderMap, names: &[&str]) -> Option<(String, String)> {
    names.iter().find_map(|name| {
        headers
            .get(*name)
            .and_then(|value| value.to_str().ok())
            .map(|value| (name.to_string(), value.to_string()))
    })
}

impl VersionHeaders {
    /// Reads the headers and mirrors them onto `span` as `guardrail.headers.*`.
    pub fn record(headers: &HeaderMap, span: &SpanRef<'_>) -> Self {
        let client_constraint = first_header(headers, &CONSTRAINT_HEADERS);
        let container_version = first_header(headers, &VERSION_HEADERS);
        let server_start = first_header(headers, &[SERVER_START_HEADER]);

        for (name, value) in [&client_constraint, &container_version, &server_start]
            .into_iter()
            .flatten()
        {
            span.set_attribute(KeyValue::new(format!("guardrail.headers.{name}"), value.clone()));
        }

        Self {
            client_constraint: client_constraint.map(|(_, v)| v),
            container_version: container_version.map(|(_, v)| v),
            server_start: server_start.map(|(_, v)| v),
        }
    }
}

/// Rate-limited compatibility checker. The deadline is shared by every
/// interaction using the same client and is updated racily.
#[derive(Debug)]
pub struct VersionCheck {
    next_check_ms: AtomicI64,
    interval: Duration,
}

impl Default for VersionCheck {
    fn default() -> Self {
        Self::new(DEFAULT_CHECK_INTERVAL)
    }
}

impl VersionCheck {
    pub fn new(interval: Duration) -> Self {
        Self {
            next_check_ms: AtomicI64::new(0),
            interval,
        }
    }

    /// True at most once per interval.
    pub fn due(&self) -> bool {
        let now = chrono::Utc::now().timestamp_millis();
        if now < self.next_check_ms.load(Ordering::Relaxed) {
            return false;
        }
        let interval_ms = i64::try_from(self.interval.as_millis()).unwrap_or(i64::MAX);
        self.next_check_ms
            .store(now.saturating_add(interval_ms), Ordering::Relaxed);
        true
    }

    pub fn inspect(&self, headers: &HeaderMap, span: &SpanRef<'_>) -> Compatibility {
        let advertised = VersionHeaders::record(headers, span);
        if !self.due() {
            return Compatibility::Skipped;
        }
        check_compatibility(&advertised, span)
    }
}

pub fn check_compatibility(headers: &VersionHeaders, span: &SpanRef<'_>) -> Compatibility {
    let Some(raw_constraint) = headers.client_constraint.as_deref() else {
        warn!(
            "No version constraint header in guardrails response; upgrade the guardrails container to 2.0.0 or later to enable compatibility checks"
        );
        span.set_attribute(KeyValue::new("guardrail.response.version_constraint", "empty"));
        return Compatibility::Unknown;
    };

    let client_ok = match satisfies(raw_constraint, CLIENT_VERSION) {
        Ok(ok) => ok,
        Err(err) => {
            warn!(error = %err, "Unparseable guardrails version constraint");
            return Compatibility::Unknown;
        }
    };
    span.set_attribute(KeyValue::new(
        "guardrail.response.client_version_constraint",
        raw_constraint.to_string(),
    ));
    span.set_attribute(KeyValue::new("guardrail.response.client_version", CLIENT_VERSION));
    if !client_ok {
        warn!(
            container_version = headers.container_version.as_deref().unwrap_or("unknown"),
            required = raw_constraint,
            client_version = CLIENT_VERSION,
            "Guardrails endpoint requires a different client version"
        );
        return Compatibility::Incompatible;
    }
    debug!(
        constraint = raw_constraint,
        client_version = CLIENT_VERSION,
        "Client satisfies guardrails version constraint"
    );

    let Some(container_version) = headers.container_version.as_deref() else {
        warn!("No version header in guardrails response, compatibility unknown");
        span.set_attribute(KeyValue::new("guardrail.response.container_version", "empty"));
        return Compatibility::Unknown;
    };

    let container_ok = match satisfies(CONTAINER_VERSION_CONSTRAINT, container_version) {
        Ok(ok) => ok,
        Err(err) => {
            warn!(error = %err, "Unparseable guardrails container version");
            return Compatibility::Unknown;
        }
    };
    if container_ok {
        span.set_attribute(KeyValue::new(
            "guardrail.response.container_client_version_constraint",
            CONTAINER_VERSION_CONSTRAINT,
        ));
        Compatibility::Compatible
    } else {
        warn!(
            container_version,
            supported = CONTAINER_VERSION_CONSTRAINT,
            "Guardrails container version is outside the supported range"
        );
        span.set_attribute(KeyValue::new(
            "guardrail.response.container_version",
            container_version.to_string(),
        ));
        span.set_attribute(KeyValue::new(
            "guardrail.container_version_constraint",
            CONTAINER_VERSION_CONSTRAINT,
        ));
        Compatibility::Incompatible
    }
}
