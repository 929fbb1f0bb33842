fn main() {
    match git_replay::run() {
        Ok(code) => std::process::exit(code),
        Err(error) => {
            eprintln!("git-replay: {error}");
            std::process::exit(1);
        }
    }
}
