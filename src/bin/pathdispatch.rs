fn main() -> anyhow::Result<()> {
    pathdispatch::cli::run_cli()
}
