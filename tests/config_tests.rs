use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use lucky_carousel::config::{
    ClaimBackend, Configuration, ENV_ALLOWED_DOMAIN, ENV_CLAIM_SCRIPT_URL, ENV_SHEETS_API_KEY,
    ENV_SPREADSHEET_ID, SheetSettings, WinnerTrigger,
};

fn parse(yaml: &str) -> Configuration {
    serde_yaml::from_str(yaml).unwrap()
}

#[test]
fn parse_kebab_case_config() {
    let cfg = parse(
        r#"
catalog:
  - asset: people/alice.jpg
    name: Alice
    caption: Platform team
  - asset: people/bob.jpg
    name: Bob
winner-name: Bob
slideshow:
  slide-duration: 4s
  recap-interval-max: 250ms
assets:
  root: /srv/carousel
"#,
    );
    assert_eq!(cfg.catalog.len(), 2);
    assert_eq!(cfg.catalog[0].caption, "Platform team");
    assert_eq!(cfg.catalog[1].caption, "");
    assert_eq!(cfg.winner_name.as_deref(), Some("Bob"));
    assert_eq!(cfg.slideshow.slide_duration, Duration::from_secs(4));
    assert_eq!(cfg.slideshow.recap_interval_max, Duration::from_millis(250));
    assert_eq!(cfg.slideshow.startup_delay, Duration::from_secs(5));
    assert_eq!(cfg.assets.root, PathBuf::from("/srv/carousel"));
    assert!(cfg.validated().is_ok());
}

#[test]
fn defaults_match_show_constants() {
    let cfg = Configuration::default();
    assert_eq!(cfg.slideshow.startup_delay, Duration::from_secs(5));
    assert_eq!(cfg.slideshow.slide_duration, Duration::from_secs(3));
    assert_eq!(cfg.slideshow.recap_interval_min, Duration::from_millis(100));
    assert_eq!(cfg.slideshow.recap_interval_max, Duration::from_millis(300));
    assert_eq!(cfg.transition.normal_duration, Duration::from_millis(1500));
    assert_eq!(cfg.transition.recap_duration, Duration::from_millis(300));
    assert_eq!(cfg.transition.winner_duration(), Duration::from_millis(1950));
    assert_eq!(cfg.assets.load_timeout, Duration::from_secs(10));
    assert_eq!(cfg.claims.poll_interval, Duration::from_secs(10));
    assert_eq!(cfg.claims.number_range(), 1..=100);
    assert_eq!(
        cfg.winner_trigger,
        WinnerTrigger::RecapSequence {
            grid_dwell: Duration::from_secs(2),
            flash_dwell: Duration::from_secs(2),
            winner_pause: Duration::from_millis(300),
        }
    );
}

#[test]
fn winner_trigger_is_tagged_by_kind() {
    let cfg = parse(
        r#"
catalog-dir: /photos
winner-trigger:
  kind: after-duration
  after: 2m
"#,
    );
    assert_eq!(
        cfg.winner_trigger,
        WinnerTrigger::AfterDuration {
            after: Duration::from_secs(120)
        }
    );
    assert!(!cfg.winner_trigger.uses_recap());

    let cfg = parse(
        r#"
catalog-dir: /photos
winner-trigger:
  kind: recap-sequence
  grid-dwell: 1s
"#,
    );
    assert_eq!(
        cfg.winner_trigger,
        WinnerTrigger::RecapSequence {
            grid_dwell: Duration::from_secs(1),
            flash_dwell: Duration::from_secs(2),
            winner_pause: Duration::from_millis(300),
        }
    );
}

#[test]
fn unknown_keys_are_rejected() {
    assert!(serde_yaml::from_str::<Configuration>("slideshow:\n  slide-durations: 3s\n").is_err());
    assert!(serde_yaml::from_str::<Configuration>("photo-library-path: /photos\n").is_err());
    assert!(
        serde_yaml::from_str::<Configuration>("winner-trigger:\n  kind: lottery\n").is_err()
    );
}

#[test]
fn validation_catches_bad_values() {
    let err = Configuration::default().validated().unwrap_err();
    assert!(err.to_string().contains("catalog"));

    let both = parse(
        r#"
catalog-dir: /photos
catalog:
  - asset: a.jpg
    name: A
"#,
    );
    assert!(both.validated().is_err());

    let inverted = parse(
        r#"
catalog-dir: /photos
slideshow:
  recap-interval-min: 500ms
  recap-interval-max: 100ms
"#,
    );
    assert!(inverted.validated().is_err());

    let instant = parse(
        r#"
catalog-dir: /photos
winner-trigger:
  kind: after-duration
  after: 0s
"#,
    );
    assert!(instant.validated().is_err());

    let numbers = parse(
        r#"
catalog-dir: /photos
claims:
  first-number: 10
  last-number: 5
"#,
    );
    assert!(numbers.validated().is_err());
}

#[test]
fn env_fills_missing_claim_settings() {
    let env: HashMap<&str, &str> = HashMap::from([
        (ENV_SPREADSHEET_ID, "sheet-from-env"),
        (ENV_SHEETS_API_KEY, "key-from-env"),
        (ENV_CLAIM_SCRIPT_URL, "https://script.example/exec"),
        (ENV_ALLOWED_DOMAIN, "corp.example"),
    ]);
    let mut cfg = parse(
        r#"
catalog-dir: /photos
claims:
  spreadsheet-id: sheet-from-file
"#,
    );
    cfg.claims
        .apply_env_from(|key| env.get(key).map(|value| value.to_string()));

    assert_eq!(cfg.claims.allowed_domain.as_deref(), Some("corp.example"));
    assert_eq!(
        cfg.claims.backend(),
        ClaimBackend::Sheet(SheetSettings {
            spreadsheet_id: "sheet-from-file".into(),
            api_key: "key-from-env".into(),
            script_url: "https://script.example/exec".into(),
        })
    );
}

#[test]
fn incomplete_claim_settings_disable_the_board() {
    let mut cfg = parse("catalog-dir: /photos\nclaims:\n  api-key: k\n");
    cfg.claims.apply_env_from(|_| None);
    assert_eq!(
        cfg.claims.backend(),
        ClaimBackend::Disabled {
            missing: vec!["spreadsheet-id", "script-url"]
        }
    );

    let local = parse("catalog-dir: /photos\nclaims:\n  local: true\n");
    assert_eq!(local.claims.backend(), ClaimBackend::Local);
}

#[test]
fn loads_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.yaml");
    std::fs::write(&path, "catalog-dir: /photos\nwinner-name: Zoe\n").unwrap();
    let cfg = Configuration::from_yaml_file(&path).unwrap().validated().unwrap();
    assert_eq!(cfg.catalog_dir, Some(PathBuf::from("/photos")));
    assert!(Configuration::from_yaml_file(dir.path().join("missing.yaml")).is_err());
}
