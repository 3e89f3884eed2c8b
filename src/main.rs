// Demo-Harness für den In-Call Manager
fn main() -> anyhow::Result<()> {
    incall_lib::run()
}
