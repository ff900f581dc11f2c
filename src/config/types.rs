use config_macros::FromYaml;
use std::collections::HashMap;

use crate::config::parser::FromYaml;

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_SERVER_NAME: &str = "_";
pub const DEFAULT_MAX_BODY_SIZE: usize = 1_048_576;
pub const DEFAULT_LOCATION_PATH: &str = "/";
pub const DEFAULT_ROOT: &str = "./www";
pub const DEFAULT_INDEX: &str = "index.html";

/// Redirect codes a LocationRule's `redirect` may carry. 301/302/303/307/308 only;
/// checked by `validate::validate_configs`, not by the derive.
#[derive(Debug, Clone, Default, FromYaml)]
pub struct RedirectRule {
    pub status: u16,
    pub target: String,
}

/// A location with `cgi` set must name both a root and a non-empty
/// extension set; enforced at validation time, not during parsing.
#[derive(Debug, Clone, Default, FromYaml)]
pub struct CgiRule {
    pub root: String,
    pub extensions: Vec<String>,
}

/// One `location` block. Every field but `path` is an override of the
/// owning ServerConfig; `None`/empty means "inherit" (§4.5). `autoindex`
/// is intentionally `Option<bool>`, not `bool`, so that "unset" and
/// "explicitly off" are distinguishable (§9, tri-state inheritance).
#[derive(Debug, Clone, FromYaml)]
pub struct LocationRule {
    pub path: String,
    pub root: Option<String>,
    pub index: Option<Vec<String>>,
    pub methods: Option<Vec<String>>,
    pub autoindex: Option<bool>,
    pub redirect: Option<RedirectRule>,
    pub cgi: Option<CgiRule>,
    pub error_pages: Option<HashMap<u16, String>>,
    pub max_body: Option<usize>,
}

impl Default for LocationRule {
    fn default() -> Self {
        Self {
            path: DEFAULT_LOCATION_PATH.to_string(),
            root: None,
            index: None,
            methods: None,
            autoindex: None,
            redirect: None,
            cgi: None,
            error_pages: None,
            max_body: None,
        }
    }
}

impl LocationRule {
    pub fn has_redirect(&self) -> bool {
        self.redirect.is_some()
    }

    pub fn has_cgi(&self) -> bool {
        self.cgi.is_some()
    }
}

#[derive(Debug, Clone, FromYaml)]
pub struct ServerConfig {
    pub host: String,
    pub ports: Vec<u16>,
    pub server_name: String,
    pub root: String,
    pub index: Vec<String>,
    pub methods: Vec<String>,
    pub autoindex: bool,
    pub error_pages: HashMap<u16, String>,
    pub max_body: Option<usize>,
    pub locations: Vec<LocationRule>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            ports: vec![DEFAULT_PORT],
            server_name: DEFAULT_SERVER_NAME.to_string(),
            root: DEFAULT_ROOT.to_string(),
            index: vec![DEFAULT_INDEX.to_string()],
            methods: vec!["GET", "POST", "PUT", "DELETE", "HEAD"]
                .into_iter()
                .map(String::from)
                .collect(),
            autoindex: false,
            error_pages: HashMap::new(),
            max_body: None,
            locations: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, FromYaml)]
pub struct Config {
    pub max_body: Option<usize>,
    pub error_pages: Option<HashMap<u16, String>>,
    pub servers: Vec<ServerConfig>,
}
