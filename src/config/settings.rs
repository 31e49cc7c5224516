use std::path::PathBuf;
use std::time::Duration;

pub const DESKTOP_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Marker contained in the URLs of first-party scripts.
pub const FIRST_PARTY_SCRIPT_MARKER: &str = "n01";

/// Memory-saving flags for constrained hosts (serverless functions).
const CONSTRAINED_ARGS: &[&str] = &[
    "--disable-gpu",
    "--disable-dev-shm-usage",
    "--disable-setuid-sandbox",
    "--no-sandbox",
    "--no-zygote",
    "--single-process",
    "--disable-web-security",
    "--disable-features=IsolateOrigins,site-per-process,TranslateUI,BlinkGenPropertyTrees",
    "--disable-blink-features=AutomationControlled",
    "--disable-software-rasterizer",
    "--disable-extensions",
    "--disable-background-networking",
    "--disable-background-timer-throttling",
    "--disable-backgrounding-occluded-windows",
    "--disable-breakpad",
    "--disable-component-extensions-with-background-pages",
    "--disable-ipc-flooding-protection",
    "--disable-renderer-backgrounding",
    "--enable-features=NetworkService,NetworkServiceInProcess",
    "--force-color-profile=srgb",
    "--hide-scrollbars",
    "--mute-audio",
    "--disable-accelerated-2d-canvas",
    "--disable-canvas-aa",
    "--disable-2d-canvas-clip-aa",
    "--js-flags=--max-old-space-size=512",
];

const PERMISSIVE_ARGS: &[&str] = &[
    "--no-sandbox",
    "--disable-setuid-sandbox",
    "--disable-blink-features=AutomationControlled",
    "--disable-dev-shm-usage",
];

/// Resource posture of the host the browser runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionPosture {
    Constrained,
    Permissive,
}

impl ExecutionPosture {
    /// `NAKKA_POSTURE` wins; otherwise serverless markers select `Constrained`.
    pub fn from_env() -> Self {
        let explicit = std::env::var("NAKKA_POSTURE").ok();
        let serverless = std::env::var_os("VERCEL").is_some()
            || std::env::var_os("AWS_LAMBDA_FUNCTION_NAME").is_some();
        Self::resolve(explicit.as_deref(), serverless)
    }

    fn resolve(explicit: Option<&str>, serverless: bool) -> Self {
        match explicit.map(|v| v.trim().to_lowercase()).as_deref() {
            Some("constrained") => ExecutionPosture::Constrained,
            Some("permissive") => ExecutionPosture::Permissive,
            _ if serverless => ExecutionPosture::Constrained,
            _ => ExecutionPosture::Permissive,
        }
    }
}

/// The three produced operations; each gets its own launch profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    TournamentSearch,
    MatchListing,
    PlayerResults,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewportSize {
    pub width: u32,
    pub height: u32,
}

/// Which requests the page is allowed to make.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BlockingRules {
    /// CDP resource type names that are aborted outright.
    pub blocked_types: Vec<&'static str>,
    /// Abort scripts whose URL lacks the first-party marker.
    pub block_third_party_scripts: bool,
}

impl BlockingRules {
    pub fn allows(&self, resource_type: &str, url: &str) -> bool {
        if self.blocked_types.iter().any(|t| t.eq_ignore_ascii_case(resource_type)) {
            return false;
        }
        if self.block_third_party_scripts
            && resource_type.eq_ignore_ascii_case("Script")
            && !url.contains(FIRST_PARTY_SCRIPT_MARKER)
        {
            return false;
        }
        true
    }

    pub fn is_empty(&self) -> bool {
        self.blocked_types.is_empty() && !self.block_third_party_scripts
    }
}

/// Everything the browser capability needs to open a session.
#[derive(Debug, Clone)]
pub struct LaunchProfile {
    pub posture: ExecutionPosture,
    pub args: Vec<String>,
    pub executable: Option<PathBuf>,
    pub viewport: ViewportSize,
    pub blocking: BlockingRules,
    pub user_agent: &'static str,
    pub extra_headers: Vec<(&'static str, &'static str)>,
    pub launch_timeout: Duration,
}

/// Per-call-site retry ceiling and backoff base.
#[derive(Debug, Clone, Copy)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

#[derive(Debug, Clone)]
pub struct ScraperSettings {
    pub base_url: String,
    pub history_api_url: String,
    pub completed_status: i64,
    pub user_agent: &'static str,
    pub history_rate_limit_ms: u64,
    pub history_timeout_secs: u64,
    pub search_navigation_timeout: Duration,
    pub match_navigation_timeout: Duration,
    pub quiescence_ceiling: Duration,
    pub results_navigation_timeout: Duration,
    pub dynamic_content_timeout: Duration,
    pub interstitial_timeout: Duration,
    pub element_timeout: Duration,
    pub dom_settle: Duration,
    pub click_settle: Duration,
    pub search_retry: RetrySettings,
    pub matches_retry: RetrySettings,
    pub results_retry: RetrySettings,
}

impl Default for ScraperSettings {
    fn default() -> Self {
        Self {
            base_url: "https://n01darts.com/n01/tournament".to_string(),
            history_api_url: "https://tk2-228-23746.vs.sakura.ne.jp/n01/tournament".to_string(),
            completed_status: 40,
            user_agent: DESKTOP_USER_AGENT,
            history_rate_limit_ms: 100,
            history_timeout_secs: 30,
            search_navigation_timeout: Duration::from_secs(60),
            match_navigation_timeout: Duration::from_secs(60),
            quiescence_ceiling: Duration::from_secs(5),
            results_navigation_timeout: Duration::from_secs(45),
            dynamic_content_timeout: Duration::from_secs(10),
            interstitial_timeout: Duration::from_secs(15),
            element_timeout: Duration::from_secs(12),
            dom_settle: Duration::from_millis(1000),
            click_settle: Duration::from_millis(500),
            search_retry: RetrySettings {
                max_attempts: 2,
                base_delay: Duration::from_secs(2),
            },
            matches_retry: RetrySettings {
                max_attempts: 2,
                base_delay: Duration::from_secs(2),
            },
            results_retry: RetrySettings {
                max_attempts: 3,
                base_delay: Duration::from_secs(1),
            },
        }
    }
}

impl ScraperSettings {
    pub fn search_url(&self, keyword: &str) -> String {
        format!("{}/?keyword={}", self.base_url, urlencoding::encode(keyword))
    }

    pub fn tournament_url(&self, tournament_id: &str) -> String {
        format!("{}/comp.php?id={}", self.base_url, tournament_id)
    }

    pub fn results_view_url(&self, tournament_id: &str) -> String {
        format!("{}/comp.php?id={}&tab=history", self.base_url, tournament_id)
    }

    pub fn match_url(&self, match_identifier: &str) -> String {
        format!("{}/n01_view.html?tmid={}", self.base_url, match_identifier)
    }

    pub fn history_url(&self, tournament_id: &str) -> String {
        format!(
            "{}/n01_history.php?cmd=get_t_list&tdid={}&skip=0&count=30&name=",
            self.history_api_url,
            urlencoding::encode(tournament_id)
        )
    }
}

pub struct AppConfig {
    pub posture: ExecutionPosture,
    pub chromium_path: Option<PathBuf>,
    pub scraper: ScraperSettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl AppConfig {
    pub fn new() -> Self {
        Self {
            posture: ExecutionPosture::Permissive,
            chromium_path: None,
            scraper: ScraperSettings::default(),
        }
    }

    /// Settings with the environment overrides applied.
    pub fn from_env() -> Self {
        let mut config = Self::new();
        config.posture = ExecutionPosture::from_env();
        config.chromium_path = std::env::var_os("CHROMIUM_PATH").map(PathBuf::from);
        if let Some(status) = std::env::var("NAKKA_COMPLETED_STATUS")
            .ok()
            .and_then(|v| v.trim().parse().ok())
        {
            config.scraper.completed_status = status;
        }
        config
    }

    pub fn profile_for(&self, operation: Operation) -> LaunchProfile {
        let (args, viewport, blocking) = match self.posture {
            ExecutionPosture::Constrained => (
                CONSTRAINED_ARGS,
                constrained_viewport(operation),
                constrained_blocking(operation),
            ),
            ExecutionPosture::Permissive => (
                PERMISSIVE_ARGS,
                ViewportSize {
                    width: 1280,
                    height: 800,
                },
                BlockingRules::default(),
            ),
        };

        LaunchProfile {
            posture: self.posture,
            args: args.iter().map(|a| a.to_string()).collect(),
            executable: self.chromium_path.clone(),
            viewport,
            blocking,
            user_agent: self.scraper.user_agent,
            extra_headers: vec![("Cache-Control", "no-cache")],
            launch_timeout: Duration::from_secs(30),
        }
    }
}

fn constrained_viewport(operation: Operation) -> ViewportSize {
    match operation {
        Operation::PlayerResults => ViewportSize {
            width: 480,
            height: 320,
        },
        _ => ViewportSize {
            width: 800,
            height: 600,
        },
    }
}

fn constrained_blocking(operation: Operation) -> BlockingRules {
    let mut blocked_types = vec!["Image", "Font", "Media", "Stylesheet"];
    match operation {
        Operation::MatchListing => BlockingRules {
            blocked_types,
            block_third_party_scripts: false,
        },
        Operation::TournamentSearch | Operation::PlayerResults => {
            blocked_types.extend(["WebSocket", "Manifest", "Other"]);
            BlockingRules {
                blocked_types,
                block_third_party_scripts: true,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_posture_resolution() {
        assert_eq!(ExecutionPosture::resolve(None, false), ExecutionPosture::Permissive);
        assert_eq!(ExecutionPosture::resolve(None, true), ExecutionPosture::Constrained);
        assert_eq!(
            ExecutionPosture::resolve(Some("Permissive"), true),
            ExecutionPosture::Permissive
        );
        assert_eq!(
            ExecutionPosture::resolve(Some("constrained"), false),
            ExecutionPosture::Constrained
        );
        assert_eq!(ExecutionPosture::resolve(Some("bogus"), false), ExecutionPosture::Permissive);
    }

    #[test]
    fn test_constrained_profiles_shrink_viewport_and_block_resources() {
        let mut config = AppConfig::new();
        config.posture = ExecutionPosture::Constrained;

        let results = config.profile_for(Operation::PlayerResults);
        assert_eq!(results.viewport, ViewportSize { width: 480, height: 320 });
        assert!(!results.blocking.allows("Image", "https://n01darts.com/a.png"));
        assert!(!results.blocking.allows("Script", "https://ads.example.com/x.js"));
        assert!(results.blocking.allows("Script", "https://n01darts.com/n01/app.js"));
        assert!(results.blocking.allows("XHR", "https://n01darts.com/n01_tournament.php"));

        let listing = config.profile_for(Operation::MatchListing);
        assert_eq!(listing.viewport, ViewportSize { width: 800, height: 600 });
        assert!(listing.blocking.allows("Script", "https://cdn.example.com/x.js"));
        assert!(!listing.blocking.allows("Stylesheet", "https://n01darts.com/a.css"));
        assert!(listing.args.iter().any(|a| a == "--js-flags=--max-old-space-size=512"));
    }

    #[test]
    fn test_permissive_profile_blocks_nothing() {
        let config = AppConfig::new();
        let profile = config.profile_for(Operation::TournamentSearch);
        assert!(profile.blocking.is_empty());
        assert!(profile.blocking.allows("Image", "https://x/y.png"));
        assert_eq!(profile.extra_headers, vec![("Cache-Control", "no-cache")]);
    }

    #[test]
    fn test_site_urls() {
        let settings = ScraperSettings::default();
        assert_eq!(
            settings.search_url("złota bila"),
            "https://n01darts.com/n01/tournament/?keyword=z%C5%82ota%20bila"
        );
        assert_eq!(
            settings.results_view_url("t_ab_1234"),
            "https://n01darts.com/n01/tournament/comp.php?id=t_ab_1234&tab=history"
        );
        assert_eq!(
            settings.match_url("t_ab_1234_rr_1_A_B"),
            "https://n01darts.com/n01/tournament/n01_view.html?tmid=t_ab_1234_rr_1_A_B"
        );
    }
}
