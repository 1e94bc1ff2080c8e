fn main() -> anyhow::Result<()> {
    trialbench::run()
}
