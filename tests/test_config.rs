//! Checks that the shipped config file loads.
//!
//! Run with:
//!   cargo test --test test_config

use std::path::Path;

use helpbot::config::load_from;
use helpbot::logger::parse_level;

#[test]
fn default_toml_loads() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config/default.toml");
    let cfg = load_from(&path, Some("/srv/helpbot"), None).unwrap();

    assert_eq!(cfg.bot_name, "HelpBot");
    assert_eq!(cfg.paths.doc_dir, Path::new("/srv/helpbot/data"));
    assert_eq!(cfg.paths.persist_dir, Path::new("/srv/helpbot/storage"));
    assert_eq!(cfg.paths.archive_dir, Path::new("/srv/helpbot/archives"));
    assert_eq!(cfg.log_file.as_deref(), Some(Path::new("/srv/helpbot/app.log")));
    assert_eq!(cfg.maintenance.max_log_size_kb, 100);
    assert_eq!(cfg.maintenance.check_interval_secs, 0);
    assert_eq!(cfg.sessions.max_sessions, 1000);
    assert_eq!(cfg.llm.provider, "dummy");
    assert!(parse_level(&cfg.log_level).is_ok());
}
