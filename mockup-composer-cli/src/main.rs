fn main() -> anyhow::Result<()> {
    mockup_composer_cli::run()
}
