//! apt-get specifics for Debian/Ubuntu

use super::ProxySettings;

/// Base apt-get invocation: never prompt, never overwrite config files.
pub const APT_GET: &str = "apt-get --option=Dpkg::Options::=--force-confold \
                           --option=Dpkg::options::=--force-unsafe-io --assume-yes --quiet";

pub const SOURCES_FILE: &str = "/etc/apt/sources.list";

/// Where apt caches downloaded index files
pub const LISTS_DIRECTORY: &str = "/var/lib/apt/lists";

pub const PROXY_CONFIG_FILE: &str = "/etc/apt/apt.conf.d/42-sysprov-proxy-settings";

/// Prints the mirror URL of the main archive line in sources.list
pub const EXTRACT_SOURCE: &str =
    r#"awk "/^deb .* $(lsb_release -sc) .*main.*\$/{print \$2;exit}" /etc/apt/sources.list"#;

/// Turns a mirror URL on stdin into the prefix apt gives its list files
pub const SOURCE_LIST_PREFIX: &str = r#"sed 's,.*://,,' | sed 's,/$,,' | tr / _"#;

pub const DEFAULT_PACKAGES: &[&str] = &[
    "curl",
    "cpu-checker",
    "bridge-utils",
    "rsyslog-gnutls",
    "cloud-utils",
    "cloud-image-utils",
];

pub const CLOUD_ARCHIVE_PACKAGES: &[&str] = &[
    "cloud-utils",
    "cloud-image-utils",
    "lxc",
    "mongodb-server",
    "mongodb-clients",
];

/// Pocket holding the cloud archive for series that need it
pub fn cloud_tools_pocket(series: Option<&str>) -> Option<&'static str> {
    match series {
        Some("precise") => Some("precise-updates/cloud-tools"),
        _ => None,
    }
}

pub fn proxy_config_contents(settings: &ProxySettings) -> String {
    let entries = [
        ("http", &settings.http),
        ("https", &settings.https),
        ("ftp", &settings.ftp),
    ];

    entries
        .iter()
        .filter_map(|(scheme, url)| {
            url.as_ref()
                .map(|url| format!("Acquire::{}::Proxy \"{}\";", scheme, url))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proxy_config_contents() {
        let settings = ProxySettings {
            http: Some("http://proxy:3128".to_string()),
            https: Some("https://proxy:3129".to_string()),
            ftp: None,
            no_proxy: Some("localhost".to_string()),
        };
        assert_eq!(
            proxy_config_contents(&settings),
            "Acquire::http::Proxy \"http://proxy:3128\";\n\
             Acquire::https::Proxy \"https://proxy:3129\";"
        );
    }

    #[test]
    fn test_cloud_tools_pocket() {
        assert_eq!(cloud_tools_pocket(Some("precise")), Some("precise-updates/cloud-tools"));
        assert_eq!(cloud_tools_pocket(Some("trusty")), None);
        assert_eq!(cloud_tools_pocket(None), None);
    }
}
