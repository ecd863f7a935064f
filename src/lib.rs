/*!
Library core for `quad`, a university administrative portal.

Students sign up, file typed requests (leave-of-absence, student housing,
course registration), and track them; each request is routed to a fixed
department, and faculty members review, approve, or reject it. Lifecycle
events send best-effort notification email.
*/
use time::{
    format_description::FormatItem,
    macros::format_description,
    OffsetDateTime,
};

pub mod auth;
pub mod config;
pub mod inter;
pub mod lifecycle;
pub mod notify;
pub mod request;
pub mod store;
pub mod user;

/// Format for dates shown to people ("Sep 10, 2025").
pub const DATE_FMT: &[FormatItem] = format_description!("[month repr:short] [day], [year]");

/// Format produced by `<input type="date">` form fields.
pub const DATE_INPUT_FMT: &[FormatItem] = format_description!("[year]-[month]-[day]");

/// Format for timestamps shown to people.
pub const TIMESTAMP_FMT: &[FormatItem] =
    format_description!("[month repr:short] [day], [year] [hour]:[minute] UTC");

pub fn now() -> OffsetDateTime {
    OffsetDateTime::now_utc()
}

pub fn log_level_from_env() -> simplelog::LevelFilter {
    use simplelog::LevelFilter;

    let mut level_string = match std::env::var("LOG_LEVEL") {
        Err(_) => { return LevelFilter::Warn; },
        Ok(s) => s,
    };

    level_string.make_ascii_lowercase();
    match level_string.as_str() {
        "max" => LevelFilter::max(),
        "trace" => LevelFilter::Trace,
        "debug" => LevelFilter::Debug,
        "info" => LevelFilter::Info,
        "warn" => LevelFilter::Warn,
        "error" => LevelFilter::Error,
        "off" => LevelFilter::Off,
        _ => LevelFilter::Warn,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub fn ensure_logging() {
        use simplelog::{TermLogger, TerminalMode, ColorChoice};
        let log_cfg = simplelog::ConfigBuilder::new()
            .add_filter_allow_str("quad")
            .build();
        let res = TermLogger::init(
            log_level_from_env(),
            log_cfg,
            TerminalMode::Stdout,
            ColorChoice::Auto
        );

        match res {
            Ok(_) => { log::info!("Test logging started."); },
            Err(_) => { log::info!("Test logging already started."); },
        }
    }
}
