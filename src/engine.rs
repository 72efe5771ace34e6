//! Engine selection: decide per request whether LibreOffice or the remote
//! API performs the conversion.
//!
//! The remote engine only handles PDF → Office exports, and only when
//! credentials are configured. A caller that explicitly asks for the remote
//! engine on an ineligible request gets an error, never a silent fallback.

use crate::config::RemoteCredentials;
use crate::error::GatewayError;
use serde::Serialize;
use std::fmt;

/// Target formats the remote export operation produces.
pub const REMOTE_TARGETS: &[&str] = &["docx", "pptx", "xlsx"];

/// The engine the caller asked for via `X-Conversion-Engine`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestedEngine {
    /// No preference: remote when eligible, otherwise local.
    #[default]
    Auto,
    Local,
    Remote,
}

impl RequestedEngine {
    /// Parse the header value. Unknown values mean [`RequestedEngine::Auto`].
    pub fn from_header(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            Some("adobe") | Some("remote") => RequestedEngine::Remote,
            Some("libreoffice") | Some("local") => RequestedEngine::Local,
            _ => RequestedEngine::Auto,
        }
    }
}

/// A concrete conversion backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    Local,
    Remote,
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Engine::Local => f.write_str("libreoffice"),
            Engine::Remote => f.write_str("adobe"),
        }
    }
}

/// Outcome of [`select_engine`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineDecision {
    pub engine: Engine,
    /// Short explanation for logs.
    pub reason: String,
}

/// Why a request cannot go to the remote engine, or `None` when it can.
fn remote_ineligibility(
    source_ext: &str,
    target: &str,
    credentials: Option<&RemoteCredentials>,
) -> Option<String> {
    if credentials.is_none() {
        return Some("remote credentials are not configured".to_string());
    }
    if source_ext != "pdf" {
        return Some(format!("source '{source_ext}' is not pdf"));
    }
    if !REMOTE_TARGETS.contains(&target) {
        return Some(format!(
            "target '{target}' is not one of {}",
            REMOTE_TARGETS.join(", ")
        ));
    }
    None
}

/// Pick the engine for one request.
///
/// Pure and deterministic: the same inputs always produce the same decision.
pub fn select_engine(
    source_ext: &str,
    target: &str,
    requested: RequestedEngine,
    credentials: Option<&RemoteCredentials>,
) -> Result<EngineDecision, GatewayError> {
    let ineligible = remote_ineligibility(source_ext, target, credentials);

    let decision = match (requested, ineligible) {
        (RequestedEngine::Remote, Some(reason)) => {
            return Err(GatewayError::UnsupportedEngineRequest { reason });
        }
        (RequestedEngine::Remote, None) => EngineDecision {
            engine: Engine::Remote,
            reason: "remote engine requested".to_string(),
        },
        (RequestedEngine::Local, _) => EngineDecision {
            engine: Engine::Local,
            reason: "local engine requested".to_string(),
        },
        (RequestedEngine::Auto, None) => EngineDecision {
            engine: Engine::Remote,
            reason: "pdf export eligible for remote engine".to_string(),
        },
        (RequestedEngine::Auto, Some(reason)) => EngineDecision {
            engine: Engine::Local,
            reason,
        },
    };
    Ok(decision)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds() -> RemoteCredentials {
        RemoteCredentials::new("id", "secret")
    }

    #[test]
    fn header_parsing() {
        assert_eq!(RequestedEngine::from_header(None), RequestedEngine::Auto);
        assert_eq!(RequestedEngine::from_header(Some("")), RequestedEngine::Auto);
        assert_eq!(RequestedEngine::from_header(Some(" Adobe ")), RequestedEngine::Remote);
        assert_eq!(RequestedEngine::from_header(Some("remote")), RequestedEngine::Remote);
        assert_eq!(
            RequestedEngine::from_header(Some("LibreOffice")),
            RequestedEngine::Local
        );
        assert_eq!(RequestedEngine::from_header(Some("pandoc")), RequestedEngine::Auto);
    }

    #[test]
    fn auto_is_remote_iff_eligible() {
        let sources = ["pdf", "docx", "odt", "bin"];
        let targets = ["docx", "pptx", "xlsx", "pdf", "odt", "ppt"];
        let c = creds();
        for with_creds in [true, false] {
            for source in sources {
                for target in targets {
                    let credentials = with_creds.then_some(&c);
                    let d = select_engine(source, target, RequestedEngine::Auto, credentials)
                        .unwrap();
                    let eligible =
                        with_creds && source == "pdf" && REMOTE_TARGETS.contains(&target);
                    let expected = if eligible { Engine::Remote } else { Engine::Local };
                    assert_eq!(d.engine, expected, "{source}->{target} creds={with_creds}");
                }
            }
        }
    }

    #[test]
    fn forced_remote_never_falls_back() {
        let c = creds();
        let cases: [(&str, &str, Option<&RemoteCredentials>); 3] = [
            ("pdf", "docx", None),
            ("docx", "docx", Some(&c)),
            ("pdf", "odt", Some(&c)),
        ];
        for (source, target, credentials) in cases {
            let err =
                select_engine(source, target, RequestedEngine::Remote, credentials).unwrap_err();
            assert!(
                matches!(err, GatewayError::UnsupportedEngineRequest { .. }),
                "{source}->{target}"
            );
        }
    }

    #[test]
    fn forced_remote_when_eligible() {
        let c = creds();
        let d = select_engine("pdf", "pptx", RequestedEngine::Remote, Some(&c)).unwrap();
        assert_eq!(d.engine, Engine::Remote);
    }

    #[test]
    fn forced_local_is_unconditional() {
        let c = creds();
        let d = select_engine("pdf", "docx", RequestedEngine::Local, Some(&c)).unwrap();
        assert_eq!(d.engine, Engine::Local);
        let d = select_engine("xyz", "abc", RequestedEngine::Local, None).unwrap();
        assert_eq!(d.engine, Engine::Local);
    }

    #[test]
    fn auto_reason_explains_fallback() {
        let d = select_engine("pdf", "docx", RequestedEngine::Auto, None).unwrap();
        assert!(d.reason.contains("credentials"), "got: {}", d.reason);
    }
}
