use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Result, ensure};
use serde::Deserialize;

pub const ENV_SPREADSHEET_ID: &str = "LUCKY_SPREADSHEET_ID";
pub const ENV_SHEETS_API_KEY: &str = "LUCKY_SHEETS_API_KEY";
pub const ENV_CLAIM_SCRIPT_URL: &str = "LUCKY_CLAIM_SCRIPT_URL";
pub const ENV_ALLOWED_DOMAIN: &str = "LUCKY_ALLOWED_DOMAIN";
pub const ENV_CLIENT_ID: &str = "LUCKY_CLIENT_ID";

/// One explicit catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct CatalogEntry {
    /// Asset key, resolved against `assets.root`.
    pub asset: String,
    pub name: String,
    #[serde(default)]
    pub caption: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct SlideshowTiming {
    /// Delay before the first advance, leaving room for the entrance animation.
    #[serde(with = "humantime_serde")]
    pub startup_delay: Duration,
    /// Dwell per slide while cycling normally.
    #[serde(with = "humantime_serde")]
    pub slide_duration: Duration,
    /// Lower bound of the randomized recap interval.
    #[serde(with = "humantime_serde")]
    pub recap_interval_min: Duration,
    /// Upper bound of the randomized recap interval.
    #[serde(with = "humantime_serde")]
    pub recap_interval_max: Duration,
}

impl Default for SlideshowTiming {
    fn default() -> Self {
        Self {
            startup_delay: Duration::from_secs(5),
            slide_duration: Duration::from_secs(3),
            recap_interval_min: Duration::from_millis(100),
            recap_interval_max: Duration::from_millis(300),
        }
    }
}

impl SlideshowTiming {
    fn validate(&self) -> Result<()> {
        ensure!(
            !self.slide_duration.is_zero(),
            "slideshow.slide-duration must be greater than zero"
        );
        ensure!(
            !self.recap_interval_min.is_zero(),
            "slideshow.recap-interval-min must be greater than zero"
        );
        ensure!(
            self.recap_interval_min <= self.recap_interval_max,
            "slideshow.recap-interval-min must not exceed recap-interval-max"
        );
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct TransitionTiming {
    #[serde(with = "humantime_serde")]
    pub normal_duration: Duration,
    #[serde(with = "humantime_serde")]
    pub recap_duration: Duration,
    /// Winner transition length as a multiple of `normal-duration`.
    pub winner_factor: f32,
    /// Pacing of interpolation frames.
    #[serde(with = "humantime_serde")]
    pub frame_interval: Duration,
}

impl Default for TransitionTiming {
    fn default() -> Self {
        Self {
            normal_duration: Duration::from_millis(1500),
            recap_duration: Duration::from_millis(300),
            winner_factor: 1.3,
            frame_interval: Duration::from_millis(16),
        }
    }
}

impl TransitionTiming {
    pub fn winner_duration(&self) -> Duration {
        let millis = self.normal_duration.as_millis() as f64 * f64::from(self.winner_factor);
        Duration::from_millis(millis.round() as u64)
    }

    fn validate(&self) -> Result<()> {
        ensure!(
            self.winner_factor.is_finite() && self.winner_factor > 0.0,
            "transition.winner-factor must be a positive number"
        );
        ensure!(
            !self.frame_interval.is_zero(),
            "transition.frame-interval must be greater than zero"
        );
        Ok(())
    }
}

/// How the show reaches its winner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(
    tag = "kind",
    rename_all = "kebab-case",
    rename_all_fields = "kebab-case"
)]
pub enum WinnerTrigger {
    /// Full cycle, then grid recap, flash highlight and the reveal.
    RecapSequence {
        #[serde(default = "WinnerTrigger::default_grid_dwell", with = "humantime_serde")]
        grid_dwell: Duration,
        #[serde(default = "WinnerTrigger::default_flash_dwell", with = "humantime_serde")]
        flash_dwell: Duration,
        #[serde(default = "WinnerTrigger::default_winner_pause", with = "humantime_serde")]
        winner_pause: Duration,
    },
    /// Keep cycling and reveal once `after` has elapsed since the show started.
    AfterDuration {
        #[serde(with = "humantime_serde")]
        after: Duration,
    },
}

impl WinnerTrigger {
    const fn default_grid_dwell() -> Duration {
        Duration::from_secs(2)
    }

    const fn default_flash_dwell() -> Duration {
        Duration::from_secs(2)
    }

    const fn default_winner_pause() -> Duration {
        Duration::from_millis(300)
    }

    pub fn uses_recap(&self) -> bool {
        matches!(self, Self::RecapSequence { .. })
    }
}

impl Default for WinnerTrigger {
    fn default() -> Self {
        Self::RecapSequence {
            grid_dwell: Self::default_grid_dwell(),
            flash_dwell: Self::default_flash_dwell(),
            winner_pause: Self::default_winner_pause(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct AssetOptions {
    /// Directory that catalog asset keys are resolved against.
    pub root: PathBuf,
    /// Loads that take longer than this count as failures.
    #[serde(with = "humantime_serde")]
    pub load_timeout: Duration,
}

impl Default for AssetOptions {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            load_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct ClaimsConfig {
    pub spreadsheet_id: Option<String>,
    pub api_key: Option<String>,
    /// Endpoint that appends a row to the claim sheet.
    pub script_url: Option<String>,
    /// Only accounts from this e-mail domain may sign in (empty = any).
    pub allowed_domain: Option<String>,
    /// Client identifier handed to the sign-in provider.
    pub client_id: Option<String>,
    /// Keep claims in process instead of a shared sheet.
    pub local: bool,
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    pub first_number: u32,
    pub last_number: u32,
}

impl Default for ClaimsConfig {
    fn default() -> Self {
        Self {
            spreadsheet_id: None,
            api_key: None,
            script_url: None,
            allowed_domain: None,
            client_id: None,
            local: false,
            poll_interval: Duration::from_secs(10),
            first_number: 1,
            last_number: 100,
        }
    }
}

/// Connection settings for the shared claim sheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetSettings {
    pub spreadsheet_id: String,
    pub api_key: String,
    pub script_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimBackend {
    Sheet(SheetSettings),
    Local,
    Disabled { missing: Vec<&'static str> },
}

impl ClaimsConfig {
    /// Fills unset fields from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    pub fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let fill = |slot: &mut Option<String>, key: &str| {
            if slot.as_deref().is_none_or(str::is_empty) {
                if let Some(value) = lookup(key).filter(|v| !v.trim().is_empty()) {
                    *slot = Some(value);
                }
            }
        };
        fill(&mut self.spreadsheet_id, ENV_SPREADSHEET_ID);
        fill(&mut self.api_key, ENV_SHEETS_API_KEY);
        fill(&mut self.script_url, ENV_CLAIM_SCRIPT_URL);
        fill(&mut self.allowed_domain, ENV_ALLOWED_DOMAIN);
        fill(&mut self.client_id, ENV_CLIENT_ID);
    }

    pub fn backend(&self) -> ClaimBackend {
        if self.local {
            return ClaimBackend::Local;
        }
        let value = |slot: &Option<String>| {
            slot.as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        let spreadsheet_id = value(&self.spreadsheet_id);
        let api_key = value(&self.api_key);
        let script_url = value(&self.script_url);
        match (spreadsheet_id, api_key, script_url) {
            (Some(spreadsheet_id), Some(api_key), Some(script_url)) => {
                ClaimBackend::Sheet(SheetSettings {
                    spreadsheet_id,
                    api_key,
                    script_url,
                })
            }
            (spreadsheet_id, api_key, script_url) => {
                let mut missing = Vec::new();
                if spreadsheet_id.is_none() {
                    missing.push("spreadsheet-id");
                }
                if api_key.is_none() {
                    missing.push("api-key");
                }
                if script_url.is_none() {
                    missing.push("script-url");
                }
                ClaimBackend::Disabled { missing }
            }
        }
    }

    pub fn number_range(&self) -> std::ops::RangeInclusive<u32> {
        self.first_number..=self.last_number
    }

    fn validate(&self) -> Result<()> {
        ensure!(
            self.first_number <= self.last_number,
            "claims.first-number must not exceed claims.last-number"
        );
        ensure!(
            !self.poll_interval.is_zero(),
            "claims.poll-interval must be greater than zero"
        );
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct Configuration {
    /// Ordered slides; display order is list order.
    pub catalog: Vec<CatalogEntry>,
    /// Alternative to `catalog`: every image below this directory, by file name.
    pub catalog_dir: Option<PathBuf>,
    /// Display name of the slide revealed at the end of the show.
    pub winner_name: Option<String>,
    pub slideshow: SlideshowTiming,
    pub transition: TransitionTiming,
    pub winner_trigger: WinnerTrigger,
    pub assets: AssetOptions,
    pub claims: ClaimsConfig,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            catalog: Vec::new(),
            catalog_dir: None,
            winner_name: None,
            slideshow: SlideshowTiming::default(),
            transition: TransitionTiming::default(),
            winner_trigger: WinnerTrigger::default(),
            assets: AssetOptions::default(),
            claims: ClaimsConfig::default(),
        }
    }
}

impl Configuration {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let s = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&s)?)
    }

    /// Validate runtime invariants that cannot be expressed via serde defaults alone.
    pub fn validated(self) -> Result<Self> {
        ensure!(
            !self.catalog.is_empty() || self.catalog_dir.is_some(),
            "either catalog or catalog-dir must be configured"
        );
        ensure!(
            self.catalog.is_empty() || self.catalog_dir.is_none(),
            "catalog and catalog-dir are mutually exclusive"
        );
        ensure!(
            !self.assets.load_timeout.is_zero(),
            "assets.load-timeout must be greater than zero"
        );
        self.slideshow.validate()?;
        self.transition.validate()?;
        if let WinnerTrigger::AfterDuration { after } = self.winner_trigger {
            ensure!(
                !after.is_zero(),
                "winner-trigger.after must be greater than zero"
            );
        }
        self.claims.validate()?;
        Ok(self)
    }
}
