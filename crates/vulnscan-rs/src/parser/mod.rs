use quick_xml::de::from_str;

use crate::models::{HostReport, ScriptOutput, ServiceRecord};

#[derive(Debug, serde::Deserialize)]
struct NmapRun {
    #[serde(rename = "host", default)]
    hosts: Vec<NmapHost>,
}

#[derive(Debug, serde::Deserialize)]
struct NmapHost {
    #[serde(default)]
    ports: Option<NmapPorts>,
}

#[derive(Debug, serde::Deserialize)]
struct NmapPorts {
    #[serde(rename = "port", default)]
    ports: Vec<NmapPort>,
}

#[derive(Debug, serde::Deserialize)]
struct NmapPort {
    #[serde(rename = "@portid")]
    portid: u16,
    state: NmapState,
    #[serde(default)]
    service: Option<NmapService>,
    #[serde(rename = "script", default)]
    scripts: Vec<NmapScript>,
}

#[derive(Debug, serde::Deserialize)]
struct NmapState {
    #[serde(rename = "@state")]
    state: String,
}

#[derive(Debug, serde::Deserialize)]
struct NmapService {
    #[serde(rename = "@name", default)]
    name: Option<String>,
    #[serde(rename = "@product", default)]
    product: Option<String>,
    #[serde(rename = "@version", default)]
    version: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
struct NmapScript {
    #[serde(rename = "@id")]
    id: String,
    #[serde(rename = "@output", default)]
    output: String,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Decode `nmap -oX` output into per-host service records.
///
/// Every listed port is kept whatever its state; deciding what counts as a
/// finding is the executor's job.
pub fn parse_nmap_xml(xml: &str) -> Result<Vec<HostReport>, quick_xml::DeError> {
    let run: NmapRun = from_str(xml)?;

    let reports = run
        .hosts
        .into_iter()
        .map(|host| {
            let services = host
                .ports
                .map(|p| p.ports)
                .unwrap_or_default()
                .into_iter()
                .map(|p| {
                    let service = p.service.unwrap_or(NmapService {
                        name: None,
                        product: None,
                        version: None,
                    });
                    ServiceRecord {
                        port: p.portid,
                        state: p.state.state,
                        name: non_empty(service.name),
                        product: non_empty(service.product),
                        version: non_empty(service.version),
                        scripts: p
                            .scripts
                            .into_iter()
                            .map(|s| ScriptOutput {
                                id: s.id,
                                output: s.output,
                            })
                            .collect(),
                    }
                })
                .collect();

            HostReport { services }
        })
        .collect();

    Ok(reports)
}

#[cfg(test)]
mod tests {
    use super::parse_nmap_xml;

    #[test]
    fn parse_quick_scan_extracts_ports() {
        let xml = include_str!("../../fixtures/nmap_quick.xml");
        let hosts = parse_nmap_xml(xml).expect("parse should work");
        assert_eq!(hosts.len(), 1);

        let host = &hosts[0];
        assert_eq!(host.services.len(), 3);

        let http = &host.services[0];
        assert_eq!(http.port, 80);
        assert!(http.is_open());
        assert_eq!(http.name.as_deref(), Some("http"));
        assert!(http.scripts.is_empty());

        assert!(!host.services[2].is_open());
    }

    #[test]
    fn parse_full_scan_keeps_versions_and_scripts_in_order() {
        let xml = include_str!("../../fixtures/nmap_full.xml");
        let hosts = parse_nmap_xml(xml).expect("parse should work");
        assert_eq!(hosts.len(), 2);

        let http = hosts[0]
            .services
            .iter()
            .find(|s| s.port == 80)
            .expect("port 80 present");
        assert_eq!(http.product.as_deref(), Some("Apache httpd"));
        assert_eq!(http.version.as_deref(), Some("2.4.49"));
        let ids: Vec<_> = http.scripts.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["http-csrf", "http-vuln-cve2021-41773"]);
        assert!(http.scripts[1].output.contains("VULNERABLE"));
        assert!(http.scripts[1].output.contains('\n'));

        assert!(hosts[1].services.is_empty());
    }

    #[test]
    fn empty_run_has_no_hosts() {
        let hosts = parse_nmap_xml("<nmaprun></nmaprun>").unwrap();
        assert!(hosts.is_empty());
    }

    #[test]
    fn malformed_port_is_an_error() {
        let xml = r#"<nmaprun><host><address addr="10.0.0.1" addrtype="ipv4"/><ports><port protocol="tcp" portid="http"><state state="open"/></port></ports></host></nmaprun>"#;
        assert!(parse_nmap_xml(xml).is_err());
    }
}
