fn main() -> anyhow::Result<()> {
    event_catalog::run()
}
