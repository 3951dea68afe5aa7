use clap::CommandFactory;
use clap_complete::{generate_to, Shell};
use std::cell::OnceCell;
use std::env;
use std::io::Error;

include!("src/cli.rs");

fn main() -> Result<(), Error> {
    println!("cargo:rerun-if-changed=src/cli.rs");

    let outdir = match env::var_os("OUT_DIR") {
        None => return Ok(()),
        Some(outdir) => outdir,
    };

    let mut cmd = Cli::command();

    let dir: OnceCell<PathBuf> = OnceCell::new();
    for &shell in Shell::value_variants() {
        let path = generate_to(shell, &mut cmd, "gzrace", &outdir)?;
        if let Some(parent) = path.parent() {
            dir.set(parent.to_owned()).ok();
        }
    }

    if let Some(dir) = dir.get() {
        println!("cargo:warning=completion file is generated: {:?}", dir);
    }

    Ok(())
}
