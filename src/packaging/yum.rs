//! yum specifics for CentOS/RHEL

use super::ProxySettings;
use crate::shell::{self, QuoteError};

pub const YUM: &str = "yum --assumeyes --debuglevel=1";

/// Global yum configuration; proxy lines are appended here
pub const CONFIG_FILE: &str = "/etc/yum.conf";

pub const KEYFILE_DIR: &str = "/etc/pki/rpm-gpg";

pub const BASE_REPO_FILE: &str = "/etc/yum.repos.d/CentOS-Base.repo";

pub const DEFAULT_PACKAGES: &[&str] = &["curl", "bridge-utils", "rsyslog-gnutls", "cloud-utils"];

/// yum.conf takes a single proxy; http wins over https
pub fn proxy_config_contents(settings: &ProxySettings) -> String {
    settings
        .primary()
        .map(|url| format!("proxy={}", url))
        .unwrap_or_default()
}

/// Command pointing the base repository at `mirror`
pub fn replace_mirror_command(mirror: &str) -> Result<String, QuoteError> {
    // `|` delimits the sed expression, `&` and `\` are special in replacements
    let replacement = mirror
        .replace('\\', "\\\\")
        .replace('|', "\\|")
        .replace('&', "\\&");
    let expression = format!("s|#baseurl=http://mirror.centos.org|baseurl={}|g", replacement);
    Ok(format!(
        "sed -r -i -e 's|^mirrorlist|#mirrorlist|g' -e {} {}",
        shell::quote(&expression)?,
        BASE_REPO_FILE
    ))
}
