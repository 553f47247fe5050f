//! Document source registry.
//!
//! The built-in list of official documentation sources is used when the
//! configuration does not declare any `[[sources]]`.

use crate::config::{Config, SourceConfig};

/// Official Nephio and O-RAN SC documentation pages.
pub fn official_sources() -> Vec<SourceConfig> {
    vec![
        SourceConfig {
            name: "nephio-architecture".to_string(),
            urls: vec![
                "https://docs.nephio.org/docs/".to_string(),
                "https://docs.nephio.org/docs/architecture/".to_string(),
            ],
            enabled: true,
            source_type: "nephio".to_string(),
            description: "Nephio project overview and architecture".to_string(),
        },
        SourceConfig {
            name: "nephio-install-guides".to_string(),
            urls: vec![
                "https://docs.nephio.org/docs/guides/install-guides/".to_string(),
            ],
            enabled: true,
            source_type: "nephio".to_string(),
            description: "Nephio installation guides".to_string(),
        },
        SourceConfig {
            name: "nephio-user-guides".to_string(),
            urls: vec![
                "https://docs.nephio.org/docs/guides/user-guides/".to_string(),
                "https://docs.nephio.org/docs/guides/user-guides/usecase-user-guides/exercise-1-free5gc/".to_string(),
                "https://docs.nephio.org/docs/guides/user-guides/usecase-user-guides/exercise-2-oai/".to_string(),
            ],
            enabled: true,
            source_type: "nephio".to_string(),
            description: "Nephio user guides and use-case exercises".to_string(),
        },
        SourceConfig {
            name: "nephio-oran-integration".to_string(),
            urls: vec![
                "https://docs.nephio.org/docs/network-architecture/o-ran-integration/".to_string(),
            ],
            enabled: true,
            source_type: "nephio".to_string(),
            description: "O-RAN integration with Nephio".to_string(),
        },
        SourceConfig {
            name: "oran-sc-docs".to_string(),
            urls: vec!["https://docs.o-ran-sc.org/en/latest/".to_string()],
            enabled: true,
            source_type: "oran_sc".to_string(),
            description: "O-RAN Software Community documentation".to_string(),
        },
    ]
}

/// Print the configured sources as a table on stdout.
pub fn list_sources(config: &Config) {
    println!("{:<28} {:<10} {:<8} URLS", "SOURCE", "TYPE", "ENABLED");
    for source in &config.sources {
        println!(
            "{:<28} {:<10} {:<8} {}",
            source.name,
            source.source_type,
            source.enabled,
            source.urls.len()
        );
        for url in &source.urls {
            println!("  {}", url);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_official_sources_are_enabled_with_urls() {
        let sources = official_sources();
        assert!(!sources.is_empty());
        for s in &sources {
            assert!(s.enabled);
            assert!(!s.urls.is_empty());
            assert!(s.urls.iter().all(|u| u.starts_with("https://")));
        }
    }

    #[test]
    fn test_source_names_unique() {
        let sources = official_sources();
        let mut names: Vec<&str> = sources.iter().map(|s| s.name.as_str()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), sources.len());
    }
}
