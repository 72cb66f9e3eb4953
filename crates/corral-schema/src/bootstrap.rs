use crate::auth::Auth;

/// Cloud-config payload enabling password SSH login for one sudo user.
///
/// `{{Username}}`, `{{Password}}` and `{{Port}}` are replaced verbatim.
pub const BOOTSTRAP_TEMPLATE: &str = "#cloud-config
users:
  - name: {{Username}}
    plain_text_passwd: {{Password}}
    ssh_pwauth: True
    lock_passwd: False
    sudo: ['ALL=(ALL) NOPASSWD:ALL']
    groups: sudo
    shell: /bin/bash
write_files:
  - path: /etc/ssh/sshd_config.d/60-corral.conf
    content: |
      Port {{Port}}
      PermitRootLogin no
      PasswordAuthentication yes
      PubkeyAuthentication yes
      PermitEmptyPasswords no
      KbdInteractiveAuthentication no
      UsePAM yes
      AllowUsers {{Username}}
runcmd:
  - systemctl restart ssh || systemctl restart sshd
";

const DEFAULT_SSH_PORT: u16 = 22;

/// Render the bootstrap payload for `auth`.
///
/// Returns `None` when `auth` carries no credential kind.
pub fn render_bootstrap(auth: &Auth) -> Option<Vec<u8>> {
    if !auth.has_credentials() {
        return None;
    }
    let port = auth.port.unwrap_or(DEFAULT_SSH_PORT).to_string();
    let rendered = BOOTSTRAP_TEMPLATE
        .replace("{{Username}}", &auth.user)
        .replace("{{Password}}", &auth.secret)
        .replace("{{Port}}", &port);
    Some(rendered.into_bytes())
}
