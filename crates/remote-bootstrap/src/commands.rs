//! Shell commands run on workers during bootstrap

/// Default location of the k3s install script
pub const DEFAULT_INSTALL_URL: &str = "https://get.k3s.io";

/// Where the k3s agent writes its generated node password
pub const DEFAULT_NODE_PASSWORD_PATH: &str = "/etc/rancher/node/password";

/// Quote `value` for a POSIX shell
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Installs the k3s agent and joins it to the server at `join_url`
///
/// Re-running the command on an already joined worker is harmless.
pub fn join_command(install_url: &str, join_url: &str, join_token: &str) -> String {
    format!(
        "curl -sfL {} | K3S_URL={} K3S_TOKEN={} sh -",
        shell_quote(install_url),
        shell_quote(join_url),
        shell_quote(join_token)
    )
}

/// Prints the node password generated by the agent
pub fn read_password_command(password_path: &str) -> String {
    format!("cat {}", shell_quote(password_path))
}
