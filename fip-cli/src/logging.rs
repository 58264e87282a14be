//! Subscriber setup shared by both binaries.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Level name from a `FIP_LOG` value, defaulting to info.
fn base_level(value: Option<&str>) -> &'static str {
    match value {
        Some("trace") => "trace",
        Some("debug") => "debug",
        Some("warn") | Some("warning") => "warn",
        Some("error") => "error",
        _ => "info",
    }
}

fn default_directives(level: &str) -> String {
    format!("fip={level},fip_signature={level},fip_cli={level},fip_module={level}")
}

/// Install the global subscriber. Logs go to stderr so stdout stays free
/// for command output.
///
/// `RUST_LOG` wins when set; otherwise `FIP_LOG` picks the level for the
/// fip crates. `LOG_FORMAT=json` switches to JSON lines.
pub fn init_tracing() {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = base_level(std::env::var("FIP_LOG").ok().as_deref());
        EnvFilter::new(default_directives(level))
    };

    let use_json = std::env::var("LOG_FORMAT").as_deref() == Ok("json");

    if use_json {
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr));
        let _ = subscriber.try_init();
    } else {
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr));
        let _ = subscriber.try_init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_names_map_with_info_fallback() {
        assert_eq!(base_level(Some("debug")), "debug");
        assert_eq!(base_level(Some("warning")), "warn");
        assert_eq!(base_level(Some("error")), "error");
        assert_eq!(base_level(Some("loud")), "info");
        assert_eq!(base_level(None), "info");
    }

    #[test]
    fn directives_cover_every_crate() {
        insta::assert_snapshot!(
            default_directives("warn"),
            @"fip=warn,fip_signature=warn,fip_cli=warn,fip_module=warn"
        );
    }
}
