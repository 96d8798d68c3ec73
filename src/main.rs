fn main() {
    #[cfg(feature = "cli")]
    garmin_dem::cli::run();

    #[cfg(not(feature = "cli"))]
    {
        eprintln!("garmin-dem: CLI not enabled. Rebuild with `--features cli`.");
        std::process::exit(1);
    }
}
