fn main() {
    if let Err(err) = device_monitor::app::run() {
        eprintln!("monitor panel failed: {err}");
        std::process::exit(1);
    }
}
