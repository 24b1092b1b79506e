use std::io::{self, Write};
use std::path::Path;

use clap::CommandFactory;
use clap_complete::aot::Generator;
use clap_complete::shells;

use crate::cli::{Cli, CompletionShell};
use crate::error::CliError;

pub fn run_completions(shell: CompletionShell, output_path: Option<&Path>) -> Result<(), CliError> {
    let script = render_completions(shell);

    let Some(path) = output_path else {
        io::stdout().write_all(&script)?;
        return Ok(());
    };
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, &script)?;
    tracing::debug!("Wrote {:?} completions to {}", shell, path.display());
    println!("{}", path.display());
    Ok(())
}

/// Completion script for `shell`, named after the binary in the clap definition.
pub fn render_completions(shell: CompletionShell) -> Vec<u8> {
    let mut command = Cli::command();
    let mut script = Vec::new();
    match shell {
        CompletionShell::Bash => write_script(shells::Bash, &mut command, &mut script),
        CompletionShell::Zsh => write_script(shells::Zsh, &mut command, &mut script),
        CompletionShell::Fish => write_script(shells::Fish, &mut command, &mut script),
        CompletionShell::PowerShell => {
            write_script(shells::PowerShell, &mut command, &mut script);
        }
        CompletionShell::Elvish => write_script(shells::Elvish, &mut command, &mut script),
    }
    script
}

fn write_script<G: Generator>(generator: G, command: &mut clap::Command, script: &mut Vec<u8>) {
    let bin_name = command.get_name().to_string();
    clap_complete::generate(generator, command, bin_name, script);
}
