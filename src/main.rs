fn main() {
    if let Err(err) = csv_migrate::run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
