use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use std::io::ErrorKind;
use std::path::Path;
use tokio::fs;

use crate::config::{Config, ServerConfig};
use crate::error::{plain_text, AppError};
use crate::handlers::base_url;
use crate::handlers::upload::upload_file;
use crate::services::naming::format_bytes;
use crate::AppState;

/// Upload page assets served from `public_dir`
pub const PUBLIC_ASSETS: [&str; 3] = ["index.html", "style.css", "upload.js"];

/// User agents that get the text banner instead of the upload page
const CLI_AGENTS: [&str; 5] = ["curl", "wget", "httpie", "python-requests", "powershell"];

/// Landing page
/// GET /
pub async fn root(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_ascii_lowercase();

    if CLI_AGENTS.iter().any(|cli| agent.contains(cli)) {
        let base = base_url(&state.config.server, &headers);
        return plain_text(StatusCode::OK, usage_banner(&base, &state.config));
    }

    (StatusCode::FOUND, [(header::LOCATION, "/index.html")]).into_response()
}

fn usage_banner(base: &str, config: &Config) -> String {
    format!(
        "oncedrop - one-time file sharing\n\
         \n\
         Usage:\n\
         \x20 curl {base} -T file.txt          # normal URL\n\
         \x20 curl {base}/short -T file.txt    # short URL\n\
         \n\
         Features:\n\
         \x20 • Files can only be downloaded once\n\
         \x20 • Auto-delete after download\n\
         \x20 • Unclaimed files expire after {max_age}s\n\
         \x20 • Max upload size {max_size}\n",
        base = base,
        max_age = config.expiry.max_age,
        max_size = format_bytes(config.upload.max_upload_size),
    )
}

/// Serve one of the upload page assets, `None` when it is not an asset name or
/// no such file exists under `public_dir`.
pub async fn public_asset(server: &ServerConfig, name: &str) -> Option<Response> {
    if !PUBLIC_ASSETS.contains(&name) {
        return None;
    }
    let dir = server.public_dir.as_deref()?;

    match fs::read(Path::new(dir).join(name)).await {
        Ok(bytes) => {
            let mime = mime_guess::from_path(name).first_or_octet_stream();
            Some(([(header::CONTENT_TYPE, mime.to_string())], bytes).into_response())
        }
        Err(e) if e.kind() == ErrorKind::NotFound => None,
        Err(e) => {
            tracing::warn!("Error fetching asset {}: {}", name, e);
            None
        }
    }
}

pub fn file_not_found() -> Response {
    AppError::NotFound("File not found".to_string()).into_response()
}

pub async fn not_found() -> Response {
    file_not_found()
}

pub async fn method_not_allowed() -> Response {
    AppError::MethodNotAllowed.into_response()
}

/// Paths no route matches, such as a name with a trailing slash (`/short/`):
/// PUT still uploads, GET and HEAD find nothing, anything else is 405.
pub async fn fallback(
    state: State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Body,
) -> Response {
    match method {
        Method::PUT => upload_file(state, uri, headers, body).await,
        Method::GET | Method::HEAD => file_not_found(),
        _ => method_not_allowed().await,
    }
}
