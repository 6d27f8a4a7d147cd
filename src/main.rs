fn main() {
    if let Err(err) = csv_importer::run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
