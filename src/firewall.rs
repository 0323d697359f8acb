//! iptables NAT and forwarding rules
//!
//! Rules are appended only after an `iptables -C` check, so repeating a start
//! never stacks duplicates.

use crate::error::FantasmaResult;
use crate::tool::ShellTool;
use tracing::debug;

/// One rule: optional table, chain and rule specification
struct Rule<'a> {
    table: Option<&'a str>,
    chain: &'a str,
    spec: Vec<&'a str>,
}

impl<'a> Rule<'a> {
    fn args(&self, action: &'a str) -> Vec<&'a str> {
        let mut args = Vec::with_capacity(self.spec.len() + 4);
        if let Some(table) = self.table {
            args.push("-t");
            args.push(table);
        }
        args.push(action);
        args.push(self.chain);
        args.extend(self.spec.iter().copied());
        args
    }
}

async fn ensure(tool: &ShellTool, rule: Rule<'_>) -> FantasmaResult<()> {
    if tool.privileged("iptables", &rule.args("-C")).await.is_ok() {
        debug!("iptables rule already present in {}", rule.chain);
        return Ok(());
    }
    tool.privileged("iptables", &rule.args("-A")).await?;
    Ok(())
}

/// Masquerade traffic leaving through `source` and forward between the two
/// interfaces (replies only towards `target`)
pub async fn enable_nat(tool: &ShellTool, source: &str, target: &str) -> FantasmaResult<()> {
    ensure(
        tool,
        Rule {
            table: Some("nat"),
            chain: "POSTROUTING",
            spec: vec!["-o", source, "-j", "MASQUERADE"],
        },
    )
    .await?;

    ensure(
        tool,
        Rule {
            table: None,
            chain: "FORWARD",
            spec: vec![
                "-i", source, "-o", target, "-m", "state", "--state", "RELATED,ESTABLISHED", "-j",
                "ACCEPT",
            ],
        },
    )
    .await?;

    ensure(
        tool,
        Rule {
            table: None,
            chain: "FORWARD",
            spec: vec!["-i", target, "-o", source, "-j", "ACCEPT"],
        },
    )
    .await
}

/// Flush NAT POSTROUTING and FORWARD; failures are ignored
pub async fn flush(tool: &ShellTool) {
    tool.try_privileged("iptables", &["-t", "nat", "-F", "POSTROUTING"]).await;
    tool.try_privileged("iptables", &["-F", "FORWARD"]).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::testing::FakeRunner;
    use crate::tool::Elevation;

    #[tokio::test]
    async fn test_appends_missing_rules() {
        let runner = FakeRunner::new();
        runner.fail("iptables -t nat -C").fail("iptables -C");
        let tool = ShellTool::new(runner.clone(), Elevation::None);

        enable_nat(&tool, "eth0", "wlan0").await.unwrap();

        let appended: Vec<String> = runner
            .calls()
            .into_iter()
            .filter(|c| c.contains(" -A "))
            .collect();
        assert_eq!(
            appended,
            vec![
                "iptables -t nat -A POSTROUTING -o eth0 -j MASQUERADE",
                "iptables -A FORWARD -i eth0 -o wlan0 -m state --state RELATED,ESTABLISHED -j ACCEPT",
                "iptables -A FORWARD -i wlan0 -o eth0 -j ACCEPT",
            ]
        );
    }

    #[tokio::test]
    async fn test_existing_rules_not_duplicated() {
        let runner = FakeRunner::new();
        let tool = ShellTool::new(runner.clone(), Elevation::None);

        enable_nat(&tool, "eth0", "wlan0").await.unwrap();

        assert!(!runner.calls().iter().any(|c| c.contains(" -A ")));
        assert_eq!(runner.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_flush_ignores_failures() {
        let runner = FakeRunner::new();
        runner.fail("sudo iptables");
        let tool = ShellTool::new(runner.clone(), Elevation::Sudo);

        flush(&tool).await;
        assert_eq!(
            runner.calls(),
            vec!["sudo iptables -t nat -F POSTROUTING", "sudo iptables -F FORWARD"]
        );
    }
}
