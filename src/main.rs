fn main() -> std::process::ExitCode {
    streakcut_lib::run()
}
