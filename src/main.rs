fn main() {
    if let Err(err) = retail_warehouse::run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
