//! Shell completion generation for csvexport
//!
//! This module provides functionality to generate shell completion scripts
//! for bash, zsh and fish, with dynamic completion for storage disk names.

use clap::CommandFactory;
use clap_complete::{Shell, generate};

use crate::cli::CliArgs;
use crate::error::{ConfigError, Result};

const BIN_NAME: &str = "csvexport";

/// Generate shell completion script
///
/// # Arguments
/// * `shell_name` - Shell type (bash, zsh, fish)
///
/// # Returns
/// * `Result<String>` - Completion script or error for an unsupported shell
pub fn generate_completion(shell_name: &str) -> Result<String> {
    let shell = parse_shell(shell_name)?;
    let base = base_completion(shell);

    let script = match shell {
        Shell::Bash => bash_completion(&base),
        Shell::Zsh => zsh_completion(&base),
        _ => fish_completion(&base),
    };
    Ok(script)
}

/// Parse shell name string to Shell enum
fn parse_shell(shell_name: &str) -> Result<Shell> {
    match shell_name.to_lowercase().as_str() {
        "bash" => Ok(Shell::Bash),
        "zsh" => Ok(Shell::Zsh),
        "fish" => Ok(Shell::Fish),
        _ => Err(ConfigError::InvalidValue {
            field: "shell".to_string(),
            value: shell_name.to_string(),
        }
        .into()),
    }
}

/// Script generated by clap for the current argument definitions
fn base_completion(shell: Shell) -> String {
    let mut cmd = CliArgs::command();
    let mut buffer = Vec::new();
    generate(shell, &mut cmd, BIN_NAME, &mut buffer);
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Bash completion with dynamic disk name support
fn bash_completion(base: &str) -> String {
    format!(
        r#"{base}

# Custom completion for storage disk names
_csvexport_list_disks() {{
    csvexport config --list-disks 2>/dev/null
}}

_csvexport_enhanced() {{
    local cur prev words cword
    _init_completion || return

    if [[ "$prev" == "--disk" ]]; then
        COMPREPLY=($(compgen -W "$(_csvexport_list_disks)" -- "$cur"))
        return 0
    fi

    _csvexport "$@"
}}

complete -F _csvexport_enhanced csvexport
"#
    )
}

/// Zsh completion with dynamic disk name support
fn zsh_completion(base: &str) -> String {
    format!(
        r#"{base}

# Custom completion for storage disk names
_csvexport_disks() {{
    local -a disks
    disks=($(csvexport config --list-disks 2>/dev/null))
    _describe 'disks' disks
}}

_csvexport_enhanced() {{
    if [[ ${{words[CURRENT-1]}} == "--disk" ]]; then
        _csvexport_disks
        return 0
    fi

    _csvexport "$@"
}}

compdef _csvexport_enhanced csvexport
"#
    )
}

/// Fish completion with dynamic disk name support
fn fish_completion(base: &str) -> String {
    format!(
        r#"{base}

# Custom completion for storage disk names
function __csvexport_list_disks
    csvexport config --list-disks 2>/dev/null
end

complete -c csvexport -n "__fish_seen_subcommand_from export" -l disk -f -a "(__csvexport_list_disks)" -d "Storage disk name"
"#
    )
}
