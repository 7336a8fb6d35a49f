use anyhow::Result;

fn main() -> Result<()> {
    passfilt::cli::run()
}
