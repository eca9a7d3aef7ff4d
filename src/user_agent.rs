//! User-Agent string for upstream API traffic.
//!
//! Bibliographic APIs (Crossref in particular) route clients that identify
//! themselves with a contact address into a "polite" pool with better
//! service, so the contact goes into the header when one is configured.

/// Project URL for User-Agent identification.
const PROJECT_UA_URL: &str = "https://github.com/fierce/harvester";

/// Default User-Agent for harvest requests.
#[must_use]
pub(crate) fn default_harvest_user_agent(mailto: Option<&str>) -> String {
    let version = env!("CARGO_PKG_VERSION");
    match mailto.map(str::trim).filter(|m| !m.is_empty()) {
        Some(mailto) => {
            format!("harvester/{version} (metadata-harvester; +{PROJECT_UA_URL}; mailto:{mailto})")
        }
        None => format!("harvester/{version} (metadata-harvester; +{PROJECT_UA_URL})"),
    }
}
