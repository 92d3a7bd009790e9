use semver::Version;
use thiserror::Error;

pub const APP_NAME: &str = "Freight Quote";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");
pub const GIT_TAG: Option<&str> = option_env!("GIT_TAG");

/// Version of the price composition policy (base, then accessorials, then
/// fuel). Any change to the order or rounding of those steps bumps it.
pub const PRICING_POLICY_VERSION: &str = "1.0.0";

#[derive(Error, Debug)]
pub enum VersionError {
    #[error("invalid version format: {0}")]
    InvalidVersion(String),
}

fn parse_version_str(input: &str) -> Result<Version, VersionError> {
    let trimmed = input.trim_start_matches(|ch| ch == 'v' || ch == 'V');
    Version::parse(trimmed).map_err(|err| VersionError::InvalidVersion(err.to_string()))
}

pub fn current_version() -> Result<Version, VersionError> {
    if let Some(tag) = GIT_TAG {
        return parse_version_str(tag);
    }

    parse_version_str(APP_VERSION)
}

pub fn pricing_policy_version() -> Version {
    Version::parse(PRICING_POLICY_VERSION).unwrap_or_else(|_| Version::new(1, 0, 0))
}

pub fn version_label() -> String {
    if let Some(tag) = GIT_TAG {
        tag.to_string()
    } else {
        format!("v{}", APP_VERSION)
    }
}

pub fn user_agent() -> String {
    format!("freight-quote/{}", version_label())
}
