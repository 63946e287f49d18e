//! Version and build information.

use serde::Deserialize;

/// Package version from Cargo.toml.
pub const PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build metadata supplied by the deployment (CI build number, commit SHA).
///
/// Loaded from the `[build_info]` config section; both fields are optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct BuildInfo {
    #[serde(default)]
    pub build_num: Option<String>,
    #[serde(default)]
    pub sha1: Option<String>,
}

impl BuildInfo {
    pub fn new(build_num: impl Into<String>, sha1: impl Into<String>) -> Self {
        Self {
            build_num: Some(build_num.into()),
            sha1: Some(sha1.into()),
        }
    }

    /// Full version string: `{version}+{build_num}.{sha}`, with the SHA
    /// shortened to 7 characters and `unknown` for missing fields.
    ///
    /// Examples:
    /// - `0.1.0+5.asdf123`
    /// - `0.1.0+unknown.unknown`
    pub fn version_string(&self) -> String {
        let build_num = self.build_num.as_deref().unwrap_or("unknown");
        let sha = self.sha1.as_deref().unwrap_or("unknown");
        let short: String = sha.chars().take(7).collect();
        format!("{PKG_VERSION}+{build_num}.{short}")
    }
}
