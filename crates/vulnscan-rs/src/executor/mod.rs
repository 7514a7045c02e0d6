use std::{sync::Arc, time::Duration};

use tokio::time::timeout;
use tracing::debug;

use crate::{
    adapters::{ScanError, ScanRequest, ToolAdapter},
    models::{HostReport, NewFinding, ScanType, ServiceRecord, Severity},
};

/// Runs one target through the scanning tool and turns its report into
/// findings. Tool errors surface as a single [`ScanError`]; nothing is
/// salvaged from a failed run.
#[derive(Clone)]
pub struct ScanExecutor {
    adapter: Arc<dyn ToolAdapter>,
    max_duration: Option<Duration>,
}

impl ScanExecutor {
    pub fn new(adapter: Arc<dyn ToolAdapter>) -> Self {
        Self {
            adapter,
            max_duration: None,
        }
    }

    /// Treat scans running longer than `limit` as failed.
    pub fn with_max_duration(mut self, limit: Option<Duration>) -> Self {
        self.max_duration = limit;
        self
    }

    pub async fn execute(
        &self,
        scan_id: i64,
        target: &str,
        mode: ScanType,
    ) -> Result<Vec<NewFinding>, ScanError> {
        let req = ScanRequest {
            target: target.to_string(),
            mode,
        };
        let hosts = match self.max_duration {
            Some(limit) => timeout(limit, self.adapter.run(req))
                .await
                .map_err(|_| ScanError::Timeout(limit))??,
            None => self.adapter.run(req).await?,
        };

        let findings = findings_from_hosts(scan_id, &hosts);
        debug!(
            job_id = scan_id,
            tool = self.adapter.name(),
            scan_target = target,
            hosts = hosts.len(),
            findings = findings.len(),
            "target scanned"
        );
        Ok(findings)
    }
}

/// One finding per open port, in report order.
pub fn findings_from_hosts(scan_id: i64, hosts: &[HostReport]) -> Vec<NewFinding> {
    hosts
        .iter()
        .flat_map(|host| host.services.iter())
        .filter(|service| service.is_open())
        .map(|service| finding_for_service(scan_id, service))
        .collect()
}

fn finding_for_service(scan_id: i64, service: &ServiceRecord) -> NewFinding {
    let banner = [service.product.as_deref(), service.version.as_deref()]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(" ");

    let mut finding = NewFinding {
        scan_id,
        title: format!(
            "Open Port {} ({})",
            service.port,
            service.name.as_deref().unwrap_or("unknown")
        ),
        severity: Severity::Low,
        description: if banner.is_empty() {
            "Service: unknown".to_string()
        } else {
            format!("Service: {banner}")
        },
        remediation_steps: None,
    };

    // Script output replaces the port finding; with several scripts only
    // the last one survives.
    for script in &service.scripts {
        finding.title = format!("VULN: {}", script.id);
        finding.description = script.output.clone();
        finding.severity = Severity::High;
    }

    finding
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::models::ScriptOutput;

    fn service(port: u16, name: &str, scripts: &[(&str, &str)]) -> ServiceRecord {
        ServiceRecord {
            port,
            state: "open".into(),
            name: Some(name.into()),
            product: None,
            version: None,
            scripts: scripts
                .iter()
                .map(|(id, output)| ScriptOutput {
                    id: id.to_string(),
                    output: output.to_string(),
                })
                .collect(),
        }
    }

    fn host(services: Vec<ServiceRecord>) -> HostReport {
        HostReport { services }
    }

    #[test]
    fn open_port_without_script_is_one_low_finding() {
        let findings = findings_from_hosts(3, &[host(vec![service(80, "http", &[])])]);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].scan_id, 3);
        assert_eq!(findings[0].title, "Open Port 80 (http)");
        assert_eq!(findings[0].severity, Severity::Low);
        assert_eq!(findings[0].description, "Service: unknown");
    }

    #[test]
    fn banner_includes_product_and_version() {
        let mut svc = service(22, "ssh", &[]);
        svc.product = Some("OpenSSH".into());
        svc.version = Some("8.2p1".into());
        let findings = findings_from_hosts(1, &[host(vec![svc])]);
        assert_eq!(findings[0].description, "Service: OpenSSH 8.2p1");

        let mut product_only = service(80, "http", &[]);
        product_only.product = Some("nginx".into());
        let findings = findings_from_hosts(1, &[host(vec![product_only])]);
        assert_eq!(findings[0].description, "Service: nginx");
    }

    #[test]
    fn vuln_script_overrides_port_finding() {
        let findings = findings_from_hosts(
            1,
            &[host(vec![service(80, "http", &[("vuln-test", "Critical Error!")])])],
        );
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].title, "VULN: vuln-test");
        assert_eq!(findings[0].description, "Critical Error!");
        assert_eq!(findings[0].severity, Severity::High);
        assert!(!findings.iter().any(|f| f.title.starts_with("Open Port 80")));
    }

    #[test]
    fn last_script_wins() {
        let findings = findings_from_hosts(
            1,
            &[host(vec![service(
                443,
                "https",
                &[("ssl-heartbleed", "first"), ("ssl-poodle", "second")],
            )])],
        );
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].title, "VULN: ssl-poodle");
        assert_eq!(findings[0].description, "second");
    }

    #[test]
    fn closed_and_filtered_ports_are_skipped() {
        let mut closed = service(25, "smtp", &[]);
        closed.state = "closed".into();
        let mut filtered = service(8080, "http-proxy", &[]);
        filtered.state = "filtered".into();
        let findings = findings_from_hosts(
            1,
            &[host(vec![closed, service(80, "http", &[]), filtered])],
        );
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].title, "Open Port 80 (http)");
    }

    #[test]
    fn unnamed_service_renders_unknown() {
        let mut svc = service(9999, "", &[]);
        svc.name = None;
        let findings = findings_from_hosts(1, &[host(vec![svc])]);
        assert_eq!(findings[0].title, "Open Port 9999 (unknown)");
    }

    #[test]
    fn findings_span_all_hosts() {
        let findings = findings_from_hosts(
            1,
            &[
                host(vec![service(22, "ssh", &[])]),
                host(vec![]),
                host(vec![service(80, "http", &[]), service(443, "https", &[])]),
            ],
        );
        let titles: Vec<_> = findings.iter().map(|f| f.title.as_str()).collect();
        assert_eq!(
            titles,
            vec!["Open Port 22 (ssh)", "Open Port 80 (http)", "Open Port 443 (https)"]
        );
    }

    struct SlowAdapter {
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl ToolAdapter for SlowAdapter {
        fn name(&self) -> &'static str {
            "slow"
        }

        async fn run(&self, _req: ScanRequest) -> Result<Vec<HostReport>, ScanError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(vec![])
        }
    }

    #[tokio::test(start_paused = true)]
    async fn expired_scan_is_a_timeout_error() {
        let adapter = Arc::new(SlowAdapter {
            calls: AtomicUsize::new(0),
        });
        let executor = ScanExecutor::new(adapter.clone())
            .with_max_duration(Some(Duration::from_secs(5)));

        let err = executor
            .execute(1, "10.0.0.1", ScanType::Full)
            .await
            .unwrap_err();
        assert!(matches!(err, ScanError::Timeout(d) if d == Duration::from_secs(5)));
        assert_eq!(adapter.calls.load(Ordering::SeqCst), 1);
    }
}
