fn main() -> std::process::ExitCode {
    doc_translate::run()
}
