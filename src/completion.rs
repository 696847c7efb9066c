//! Shell completion scripts via clap_complete.
//!
//! Scripts are rendered in memory, then printed or written atomically into
//! `--out-dir` under the shell's conventional file name.

use std::io::{self, Write};

use anyhow::{Context, Result};
use clap::CommandFactory;
use clap_complete::{Generator, Shell as CompletionShell, generate};

use crate::{
    cli::{Cli, CompletionsArgs, Shell},
    infra::io::write_atomic,
};

impl From<Shell> for CompletionShell {
    fn from(shell: Shell) -> Self {
        match shell {
            Shell::Bash => CompletionShell::Bash,
            Shell::Zsh => CompletionShell::Zsh,
            Shell::Fish => CompletionShell::Fish,
            Shell::PowerShell => CompletionShell::PowerShell,
            Shell::Elvish => CompletionShell::Elvish,
        }
    }
}

/// Completion script for `shell`, named after the binary
pub fn render(shell: CompletionShell) -> Vec<u8> {
    let mut cmd = Cli::command();
    let bin = cmd.get_name().to_string();
    let mut buf = Vec::new();
    generate(shell, &mut cmd, bin, &mut buf);
    buf
}

pub fn run(args: CompletionsArgs) -> Result<()> {
    let shell: CompletionShell = args.shell.into();
    let script = render(shell);

    if args.stdout {
        io::stdout()
            .write_all(&script)
            .context("write completion to stdout")?;
        return Ok(());
    }

    let dir = args
        .out_dir
        .ok_or_else(|| anyhow::anyhow!("--out-dir is required unless --stdout is set"))?;
    std::fs::create_dir_all(&dir).context("create --out-dir")?;

    let path = dir.join(shell.file_name(Cli::command().get_name()));
    write_atomic(&path, &script).context("write completion file")?;

    eprintln!("Wrote completion to {}", path.display());
    Ok(())
}
