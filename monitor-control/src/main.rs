fn main() {
    if let Err(err) = device_monitor::app::run_control(std::env::args().skip(1).collect()) {
        eprintln!("monitor control failed: {err}");
        std::process::exit(1);
    }
}
