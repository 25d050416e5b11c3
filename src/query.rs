use clap::ValueEnum;
use serde::Serialize;

/// Search engines that index favicons by their MurmurHash3 fingerprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchEngine {
    Shodan,
    Zoomeye,
    Fofa,
}

impl SearchEngine {
    pub const ALL: [SearchEngine; 3] = [
        SearchEngine::Shodan,
        SearchEngine::Zoomeye,
        SearchEngine::Fofa,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            SearchEngine::Shodan => "Shodan",
            SearchEngine::Zoomeye => "ZoomEye",
            SearchEngine::Fofa => "FOFA",
        }
    }

    /// The query fragment that finds hosts serving the same icon.
    pub fn query(&self, hash: i32) -> String {
        match self {
            SearchEngine::Shodan => format!("http.favicon.hash:{}", hash),
            SearchEngine::Zoomeye => format!("iconhash:\"{}\"", hash),
            SearchEngine::Fofa => format!("icon_hash=\"{}\"", hash),
        }
    }
}
