use flowgate_pipeline::UnknownReferencePolicy;

/// Which challenge provider backend to run. Decided once at startup.
#[derive(Debug, Clone)]
pub enum CaptchaBackend {
    /// Attach to an already-running browser over its DevTools endpoint
    /// and execute the challenge script in a page.
    Browser {
        devtools_url: String,
        challenge_url: String,
        site_key: String,
    },
    /// Submit solve tasks to an external solving service.
    Remote {
        api_url: String,
        client_key: String,
        site_key: String,
        page_url: String,
    },
}

/// Server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
/// In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `8080`).
    pub port: u16,
    /// Static bearer key callers must present on `/v1` routes.
    /// Unset disables the check (local development only).
    pub api_key: Option<String>,
    /// Base URL of the upstream generation service.
    pub upstream_url: String,
    /// Path to the JSON credential seed file.
    pub credentials_file: String,
    /// Optional JSON file replacing the built-in model catalog.
    pub model_catalog_file: Option<String>,
    /// Allowed CORS origins, comma-separated. Empty means permissive.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds. Must exceed the generation
    /// timeout or long-running completions are cut off mid-flight.
    pub request_timeout_secs: u64,
    /// Hard ceiling on one generation job, submission to terminal.
    pub generation_timeout_secs: u64,
    /// When true, a credential serves at most one job at a time.
    pub exclusive_pool: bool,
    pub unknown_reference_policy: UnknownReferencePolicy,
    pub captcha: CaptchaBackend,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                    | Default                              |
    /// |----------------------------|--------------------------------------|
    /// | `HOST`                     | `0.0.0.0`                            |
    /// | `PORT`                     | `8080`                               |
    /// | `API_KEY`                  | unset (auth disabled)                |
    /// | `UPSTREAM_URL`             | `https://aisandbox-pa.googleapis.com`|
    /// | `CREDENTIALS_FILE`         | `credentials.json`                   |
    /// | `MODEL_CATALOG_FILE`       | unset (built-in catalog)             |
    /// | `CORS_ORIGINS`             | empty (permissive)                   |
    /// | `REQUEST_TIMEOUT_SECS`     | `900`                                |
    /// | `GENERATION_TIMEOUT_SECS`  | `600`                                |
    /// | `POOL_EXCLUSIVE`           | `false`                              |
    /// | `UNKNOWN_REFERENCE_POLICY` | `warn` (`warn` or `reject`)          |
    /// | `CAPTCHA_PROVIDER`         | `browser` (`browser` or `remote`)    |
    ///
    /// The browser backend reads `CDP_ENDPOINT` (required),
    /// `CHALLENGE_URL`, and `SITE_KEY` (required). The remote backend
    /// reads `SOLVER_API_URL` (required), `SOLVER_CLIENT_KEY`
    /// (required), `SOLVER_PAGE_URL`, and `SITE_KEY` (required).
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "8080".into())
            .parse()
            .expect("PORT must be a valid u16");

        let api_key = std::env::var("API_KEY").ok().filter(|k| !k.is_empty());

        let upstream_url = std::env::var("UPSTREAM_URL")
            .unwrap_or_else(|_| "https://aisandbox-pa.googleapis.com".into());

        let credentials_file =
            std::env::var("CREDENTIALS_FILE").unwrap_or_else(|_| "credentials.json".into());

        let model_catalog_file = std::env::var("MODEL_CATALOG_FILE").ok();

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "900".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let generation_timeout_secs: u64 = std::env::var("GENERATION_TIMEOUT_SECS")
            .unwrap_or_else(|_| "600".into())
            .parse()
            .expect("GENERATION_TIMEOUT_SECS must be a valid u64");

        let exclusive_pool = std::env::var("POOL_EXCLUSIVE")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        let unknown_reference_policy = match std::env::var("UNKNOWN_REFERENCE_POLICY")
            .unwrap_or_else(|_| "warn".into())
            .as_str()
        {
            "warn" => UnknownReferencePolicy::Warn,
            "reject" => UnknownReferencePolicy::Reject,
            other => panic!("UNKNOWN_REFERENCE_POLICY must be 'warn' or 'reject', got '{other}'"),
        };

        let captcha = Self::captcha_from_env();

        Self {
            host,
            port,
            api_key,
            upstream_url,
            credentials_file,
            model_catalog_file,
            cors_origins,
            request_timeout_secs,
            generation_timeout_secs,
            exclusive_pool,
            unknown_reference_policy,
            captcha,
        }
    }

    fn captcha_from_env() -> CaptchaBackend {
        let site_key = || std::env::var("SITE_KEY").expect("SITE_KEY must be set");

        match std::env::var("CAPTCHA_PROVIDER")
            .unwrap_or_else(|_| "browser".into())
            .as_str()
        {
            "browser" => CaptchaBackend::Browser {
                devtools_url: std::env::var("CDP_ENDPOINT")
                    .expect("CDP_ENDPOINT must be set for the browser captcha provider"),
                challenge_url: std::env::var("CHALLENGE_URL")
                    .unwrap_or_else(|_| "https://labs.google/fx/tools/flow".into()),
                site_key: site_key(),
            },
            "remote" => CaptchaBackend::Remote {
                api_url: std::env::var("SOLVER_API_URL")
                    .expect("SOLVER_API_URL must be set for the remote captcha provider"),
                client_key: std::env::var("SOLVER_CLIENT_KEY")
                    .expect("SOLVER_CLIENT_KEY must be set for the remote captcha provider"),
                site_key: site_key(),
                page_url: std::env::var("SOLVER_PAGE_URL")
                    .unwrap_or_else(|_| "https://labs.google/fx/tools/flow".into()),
            },
            other => panic!("CAPTCHA_PROVIDER must be 'browser' or 'remote', got '{other}'"),
        }
    }
}
