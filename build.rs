//! Build script for the `neon` man pages.
//!
//! Renders `neon.1` plus one `neon-<subcommand>.1` page per subcommand into
//! the build output directory for packaging.

use std::env;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use clap::CommandFactory;
use clap_mangen::Man;

#[path = "src/cli/mod.rs"]
mod cli;

use cli::Cli;

fn render_page(man: &Man, out_dir: &Path, file_name: &str) -> std::io::Result<()> {
    let mut buffer = Vec::new();
    man.render(&mut buffer)?;
    File::create(out_dir.join(file_name))?.write_all(&buffer)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut stdout = std::io::stdout();
    writeln!(stdout, "cargo:rerun-if-changed=build.rs")?;
    writeln!(stdout, "cargo:rerun-if-changed=src/cli/mod.rs")?;

    let out_dir =
        PathBuf::from(env::var_os("OUT_DIR").ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotFound, "OUT_DIR was not set")
        })?);

    let root = Cli::command();
    for sub in root.get_subcommands() {
        let title = format!("neon-{}", sub.get_name());
        let man = Man::new(sub.clone()).title(title.to_uppercase());
        render_page(&man, &out_dir, &format!("{title}.1"))?;
    }
    render_page(&Man::new(root), &out_dir, "neon.1")?;

    Ok(())
}
