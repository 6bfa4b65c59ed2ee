use std::io::Write;
use std::time::Instant;

/// Initialize the stderr logger for the CLI.
///
/// Progress lines read `[lapwing::] <message> <elapsed>s`, stamping each
/// line with the seconds since startup so the parse/minimize/map steps
/// double as timings. Levels above Info keep their severity tag. The
/// default level is Info; RUST_LOG overrides it.
pub fn init_logger() {
    let start = Instant::now();

    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .format(move |buf, record| {
            let severity = match record.level() {
                log::Level::Info => String::new(),
                level => format!("{}: ", level.as_str().to_lowercase()),
            };
            writeln!(
                buf,
                "[lapwing::] {}{} {:.1}s",
                severity,
                record.args(),
                start.elapsed().as_secs_f64(),
            )
        })
        .target(env_logger::Target::Stderr)
        .init();
}
