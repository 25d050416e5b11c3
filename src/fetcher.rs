use crate::error::{Error, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Response};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_tracing::TracingMiddleware;
use scraper::{Html, Selector};
use std::path::Path;
use std::time::Duration;
use url::Url;

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// `rel` tokens that declare an icon, in order of preference. `icon` also
/// covers the legacy `shortcut icon` pair.
const ICON_RELS: &[&str] = &["icon", "apple-touch-icon", "apple-touch-icon-precomposed"];

const IMAGE_EXTENSIONS: &[&str] = &[".ico", ".png", ".jpg", ".svg"];

const FALLBACK_PATH: &str = "/favicon.ico";

#[derive(Debug, Clone)]
pub struct FetcherOptions {
    pub timeout_secs: u64,
    pub retries: u32,
    pub user_agent: String,
    /// Skip TLS certificate verification. Off unless explicitly requested.
    pub accept_invalid_certs: bool,
    /// Upper bound on any body read, icon or HTML page.
    pub max_icon_size: usize,
}

impl Default for FetcherOptions {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            retries: 0,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            accept_invalid_certs: false,
            max_icon_size: 5 * 1024 * 1024,
        }
    }
}

/// Icon bytes and the URL they were finally served from.
#[derive(Debug, Clone)]
pub struct FetchedIcon {
    pub url: Url,
    pub bytes: Bytes,
    pub content_type: Option<String>,
}

/// The `Fetcher` locates and downloads favicons.
///
/// A target URL may point straight at an image, or at an HTML page whose
/// `<link rel="icon">` is followed. Pages without a usable declared icon fall
/// back to `/favicon.ico` on the same origin.
#[derive(Clone)]
pub struct Fetcher {
    client: ClientWithMiddleware,
    options: FetcherOptions,
}

impl Fetcher {
    pub fn new(options: FetcherOptions) -> Result<Self> {
        if options.accept_invalid_certs {
            tracing::warn!("TLS certificate verification is disabled");
        }

        let client = Client::builder()
            .user_agent(options.user_agent.clone())
            .timeout(Duration::from_secs(options.timeout_secs))
            .danger_accept_invalid_certs(options.accept_invalid_certs)
            .build()
            .map_err(Error::Client)?;

        let client = ClientBuilder::new(client)
            .with(TracingMiddleware::default())
            .build();

        Ok(Self { client, options })
    }

    /// Fetches the favicon for `target`, which may be a page or an image URL.
    pub async fn fetch(&self, target: &str) -> Result<FetchedIcon> {
        let url = parse_target(target)?;
        tracing::info!("Connecting to {}", url);

        let response = self.get(&url).await?;
        let page_url = response.url().clone();
        let content_type = content_type(&response);

        if looks_like_image(content_type.as_deref(), &page_url) {
            let bytes = self.read_body(&page_url, response).await?;
            return Ok(FetchedIcon {
                url: page_url,
                bytes,
                content_type,
            });
        }

        if !content_type
            .as_deref()
            .is_some_and(|ct| ct.contains("text/html"))
        {
            tracing::debug!(
                "{} served neither an image nor HTML ({:?})",
                page_url,
                content_type
            );
            return Err(Error::NotFound {
                url: page_url.to_string(),
            });
        }

        tracing::info!("Detected HTML content, searching for favicon link");
        let body = self.read_body(&page_url, response).await?;
        let html = String::from_utf8_lossy(&body);

        match extract_icon_href(&html)? {
            Some(href) => match self.fetch_declared(&page_url, &href).await {
                Ok(icon) => {
                    tracing::info!("Found declared favicon: {}", icon.url);
                    return Ok(icon);
                }
                Err(e) => tracing::warn!("Declared favicon '{}' is unusable: {}", href, e),
            },
            None => tracing::warn!("No icon tag found on {}", page_url),
        }

        self.fetch_fallback(&page_url).await
    }

    async fn fetch_declared(&self, page_url: &Url, href: &str) -> Result<FetchedIcon> {
        let icon_url = resolve_icon_url(page_url, href)?;
        if icon_url.scheme() == "data" {
            let bytes = decode_data_url(icon_url.as_str())?;
            return Ok(FetchedIcon {
                url: icon_url,
                bytes,
                content_type: None,
            });
        }
        self.fetch_icon(icon_url).await
    }

    async fn fetch_fallback(&self, page_url: &Url) -> Result<FetchedIcon> {
        let fallback_url = fallback_icon_url(page_url)?;
        tracing::warn!("Trying fallback: {}", fallback_url);
        match self.fetch_icon(fallback_url).await {
            Err(e) if e.is_not_found() => Err(Error::NotFound {
                url: page_url.to_string(),
            }),
            other => other,
        }
    }

    async fn fetch_icon(&self, icon_url: Url) -> Result<FetchedIcon> {
        let response = self.get(&icon_url).await?;
        let url = response.url().clone();
        let content_type = content_type(&response);
        let bytes = self.read_body(&url, response).await?;
        Ok(FetchedIcon {
            url,
            bytes,
            content_type,
        })
    }

    /// Sends a GET, retrying transport failures, and rejects non-2xx statuses.
    async fn get(&self, url: &Url) -> Result<Response> {
        let mut attempt = 0;
        let response = loop {
            match self.client.get(url.clone()).send().await {
                Ok(response) => break response,
                Err(e) if attempt < self.options.retries => {
                    attempt += 1;
                    tracing::debug!("Attempt {} for {} failed: {}", attempt, url, e);
                }
                Err(e) => {
                    return Err(Error::Fetch {
                        url: url.to_string(),
                        source: e,
                    });
                }
            }
        };

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Status {
                url: url.to_string(),
                status,
            });
        }
        Ok(response)
    }

    /// Streams a body into memory, aborting as soon as it outgrows the cap.
    async fn read_body(&self, url: &Url, response: Response) -> Result<Bytes> {
        let limit = self.options.max_icon_size;
        let too_large = || Error::TooLarge {
            url: url.to_string(),
            limit,
        };

        if response
            .content_length()
            .is_some_and(|len| len > limit as u64)
        {
            return Err(too_large());
        }

        let mut stream = response.bytes_stream();
        let mut buf = BytesMut::with_capacity(limit.min(16 * 1024));
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| Error::Fetch {
                url: url.to_string(),
                source: e.into(),
            })?;
            if buf.len() + chunk.len() > limit {
                tracing::debug!(
                    "{} exceeds {} bytes, aborting at {} bytes",
                    url,
                    limit,
                    buf.len() + chunk.len()
                );
                return Err(too_large());
            }
            buf.extend_from_slice(&chunk);
        }
        Ok(buf.freeze())
    }
}

/// Reads a local icon file.
pub async fn read_file(path: impl AsRef<Path>) -> Result<Bytes> {
    let path = path.as_ref();
    let data = tokio::fs::read(path).await.map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(Bytes::from(data))
}

/// Parses a user-supplied target. Bare hosts get an `https://` scheme.
pub fn parse_target(target: &str) -> Result<Url> {
    let target = target.trim();
    let candidate = if target.contains("://") {
        target.to_string()
    } else {
        format!("https://{}", target)
    };
    Url::parse(&candidate).map_err(|source| Error::InvalidUrl {
        input: target.to_string(),
        source,
    })
}

fn content_type(response: &Response) -> Option<String> {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_lowercase())
}

/// Whether a response should be treated as the icon itself.
pub fn looks_like_image(content_type: Option<&str>, url: &Url) -> bool {
    if content_type.is_some_and(|ct| ct.to_lowercase().contains("image")) {
        return true;
    }
    let path = url.path().to_lowercase();
    IMAGE_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

/// Finds the `href` of the preferred icon `<link>` in an HTML document.
pub fn extract_icon_href(html: &str) -> Result<Option<String>> {
    let selector = Selector::parse("link[rel][href]").map_err(|e| Error::Parse {
        context: "icon link selector".to_string(),
        reason: e.to_string(),
    })?;
    let document = Html::parse_document(html);

    let links: Vec<(Vec<String>, &str)> = document
        .select(&selector)
        .filter_map(|link| {
            let rel = link.value().attr("rel")?;
            let href = link.value().attr("href")?.trim();
            if href.is_empty() {
                return None;
            }
            let tokens: Vec<String> = rel.split_whitespace().map(|t| t.to_lowercase()).collect();
            Some((tokens, href))
        })
        .collect();

    for wanted in ICON_RELS {
        if let Some((_, href)) = links
            .iter()
            .find(|(tokens, _)| tokens.iter().any(|t| t == wanted))
        {
            return Ok(Some(href.to_string()));
        }
    }
    Ok(None)
}

/// Resolves an icon `href` (absolute, protocol-relative or relative) against
/// the page it was found on.
pub fn resolve_icon_url(page_url: &Url, href: &str) -> Result<Url> {
    page_url
        .join(href.trim())
        .map_err(|source| Error::InvalidUrl {
            input: href.to_string(),
            source,
        })
}

/// `/favicon.ico` on the origin of `page_url`.
pub fn fallback_icon_url(page_url: &Url) -> Result<Url> {
    page_url
        .join(FALLBACK_PATH)
        .map_err(|source| Error::InvalidUrl {
            input: page_url.to_string(),
            source,
        })
}

/// Decodes an inline `data:` icon. Only base64 payloads are supported.
pub fn decode_data_url(data_url: &str) -> Result<Bytes> {
    let parse_error = |reason: &str| Error::Parse {
        context: "data URL".to_string(),
        reason: reason.to_string(),
    };

    let rest = data_url
        .get(..5)
        .filter(|scheme| scheme.eq_ignore_ascii_case("data:"))
        .map(|_| &data_url[5..])
        .ok_or_else(|| parse_error("missing data: scheme"))?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| parse_error("missing ',' separator"))?;
    if !header.to_lowercase().ends_with(";base64") {
        return Err(parse_error("only base64 payloads are supported"));
    }

    let payload: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    STANDARD
        .decode(payload)
        .map(Bytes::from)
        .map_err(|e| parse_error(&e.to_string()))
}
