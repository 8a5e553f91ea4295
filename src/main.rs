fn main() {
    if let Err(err) = canvas_router::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
