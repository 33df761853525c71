use anyhow::Result;

fn main() -> Result<()> {
    skindect_core::run()
}
