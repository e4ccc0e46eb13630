//! Install resolution: paginated listing, lookup by name, and detection of
//! the install the process is running on.

use std::path::PathBuf;
use std::sync::OnceLock;

use regex::Regex;
use tracing::{debug, info, warn};

use crate::api::wire::Install;
use crate::api::{ApiError, RemoteApi};
use crate::settings::Environment;

/// Installs requested per page; the API's maximum.
pub const PAGE_SIZE: usize = 100;

/// Pagination stops once the next offset would exceed this.
pub const MAX_OFFSET: usize = 1000;

/// Walks the remote install listing.
#[derive(Debug, Clone)]
pub struct InstallResolver {
    api: RemoteApi,
}

impl InstallResolver {
    /// Resolver over an authenticated client.
    pub fn new(api: RemoteApi) -> Self {
        Self { api }
    }

    /// Every install visible to the credentials, in API order.
    ///
    /// Stops when the collected count reaches the reported total, a page comes
    /// back short, or the offset cap is hit. Hitting the cap returns what was
    /// collected so far.
    ///
    /// # Errors
    ///
    /// Any failed page aborts the whole listing.
    pub async fn list_installs(&self) -> Result<Vec<Install>, ApiError> {
        let mut all = Vec::new();
        let mut offset: usize = 0;

        loop {
            let page = self.api.list_installs_page(PAGE_SIZE, offset).await?;
            let (installs, total, complete) = page.into_parts();
            let page_len = installs.len();
            all.extend(installs);

            let collected = u64::try_from(all.len()).unwrap_or(u64::MAX);
            debug!(page_len, collected, total, "install page fetched");

            if complete || page_len < PAGE_SIZE || collected >= total {
                break;
            }

            offset = offset.saturating_add(PAGE_SIZE);
            if offset > MAX_OFFSET {
                warn!(
                    collected,
                    total, "install pagination safety limit reached, returning partial listing"
                );
                break;
            }
        }

        info!(count = all.len(), "installs fetched");
        Ok(all)
    }

    /// Id of the first install whose name equals `name` exactly.
    ///
    /// # Errors
    ///
    /// Returns an error if the listing fails.
    pub async fn resolve_id_by_name(&self, name: &str) -> Result<Option<String>, ApiError> {
        let installs = self.list_installs().await?;
        Ok(installs.into_iter().find(|i| i.name == name).map(|i| i.id))
    }
}

// ── Detection ───────────────────────────────────────────────────

/// Host facts used to guess the current install.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostHints {
    /// Application install path.
    pub install_path: Option<PathBuf>,
    /// Web server name, e.g. `mysite.wpengine.com`.
    pub server_name: Option<String>,
    /// Web server document root.
    pub document_root: Option<PathBuf>,
}

impl HostHints {
    /// Hints from `WPE_INSTALL_PATH` (falling back to the working directory),
    /// `SERVER_NAME`, and `DOCUMENT_ROOT`.
    pub fn from_env() -> Self {
        let non_empty = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());
        Self {
            install_path: non_empty("WPE_INSTALL_PATH")
                .map(PathBuf::from)
                .or_else(|| std::env::current_dir().ok()),
            server_name: non_empty("SERVER_NAME"),
            document_root: non_empty("DOCUMENT_ROOT").map(PathBuf::from),
        }
    }
}

/// A detected install name and environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectedInstall {
    /// Install name.
    pub name: String,
    /// Environment derived from the path or host name.
    pub environment: Environment,
}

/// Guess the current install from host hints.
///
/// Tries, in order: the install path (which must contain the trailing slash
/// after the name), the server name, then the document root.
pub fn detect_install(hints: &HostHints) -> Option<DetectedInstall> {
    if let Some(found) = hints
        .install_path
        .as_ref()
        .and_then(|p| match_nas_path(&p.to_string_lossy(), true))
    {
        return Some(found);
    }

    if let Some(found) = hints.server_name.as_deref().and_then(match_server_name) {
        return Some(found);
    }

    hints
        .document_root
        .as_ref()
        .and_then(|p| match_nas_path(&p.to_string_lossy(), false))
}

fn nas_path_regex(trailing_slash: bool) -> Option<&'static Regex> {
    static WITH_SLASH: OnceLock<Option<Regex>> = OnceLock::new();
    static WITHOUT_SLASH: OnceLock<Option<Regex>> = OnceLock::new();
    let (cell, pattern) = if trailing_slash {
        (&WITH_SLASH, r"/nas/content/(live|staging|development)/([^/]+)/")
    } else {
        (&WITHOUT_SLASH, r"/nas/content/(live|staging|development)/([^/]+)")
    };
    cell.get_or_init(|| Regex::new(pattern).ok()).as_ref()
}

fn match_nas_path(path: &str, trailing_slash: bool) -> Option<DetectedInstall> {
    // Install paths are directories; normalise so `/nas/content/live/site`
    // still matches the slash-terminated pattern.
    let path = if trailing_slash && !path.ends_with('/') {
        format!("{path}/")
    } else {
        path.to_owned()
    };
    let caps = nas_path_regex(trailing_slash)?.captures(&path)?;
    let environment = Environment::from_path_segment(caps.get(1)?.as_str());
    let name = caps.get(2)?.as_str().to_owned();
    Some(DetectedInstall { name, environment })
}

fn match_server_name(server_name: &str) -> Option<DetectedInstall> {
    let host = server_name.trim().to_ascii_lowercase();
    let suffixes = [
        (".staging.wpengine.com", Environment::Staging),
        (".dev.wpengine.com", Environment::Development),
        (".wpengine.com", Environment::Production),
    ];
    suffixes.into_iter().find_map(|(suffix, environment)| {
        host.strip_suffix(suffix)
            .filter(|name| !name.is_empty())
            .map(|name| DetectedInstall {
                name: name.to_owned(),
                environment,
            })
    })
}
