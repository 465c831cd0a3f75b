//! DevTools target discovery over HTTP.

use crate::error::CdpError;
use crate::protocol::PageTarget;
use crate::Result;

/// List the browser's targets via `GET {endpoint}/json`.
///
/// No timeout is applied here; call sites wrap this with their own budget
/// (3 s on session start, 2 s on enumeration).
pub async fn list_pages(devtools_url: &str) -> Result<Vec<PageTarget>> {
    let url = format!("{}/json", devtools_url.trim_end_matches('/'));
    let response = reqwest::get(&url)
        .await
        .map_err(|err| CdpError::DevToolsUnreachable(format!("{url}: {err}")))?;
    let pages = response
        .json::<Vec<PageTarget>>()
        .await
        .map_err(|err| CdpError::DevToolsUnreachable(format!("{url}: {err}")))?;
    Ok(pages)
}

/// Pick the target to attach: by id when given, otherwise the first `page`.
pub fn select_target<'a>(
    pages: &'a [PageTarget],
    target_id: Option<&str>,
) -> Option<&'a PageTarget> {
    match target_id {
        Some(id) => pages.iter().find(|p| p.id == id),
        None => pages.iter().find(|p| p.target_type == "page"),
    }
}
