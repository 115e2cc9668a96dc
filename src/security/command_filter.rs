//! Destructive command filter
//!
//! Every command the reasoning backend proposes passes through
//! [`CommandFilter::is_dangerous`] before it can reach the remote host.
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  proposed command                                                 │
//! │        │                                                          │
//! │        ▼                                                          │
//! │  trim + lowercase ──► any rule matches? ──yes──► [BLOCKED], -1    │
//! │                             │                                     │
//! │                             no                                    │
//! │                             ▼                                     │
//! │                     RemoteChannel::execute                        │
//! └───────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The rule set is a plain substring/regex blacklist. It misses destructive
//! actions phrased differently (`find / -delete`, `> /etc/passwd`, ...) and
//! it will occasionally block harmless commands (`rm /tmp/x`, `grep format`).
//! A blocked command is reported back to the model, so false positives only
//! cost a turn.

use lazy_static::lazy_static;
use regex::Regex;

/// A single named rule in the blacklist
struct DangerRule {
    name: &'static str,
    pattern: Regex,
}

lazy_static! {
    /// Ordered rule set, evaluated against the trimmed, lowercased command.
    static ref DANGER_RULES: Vec<DangerRule> = vec![
        rule("rm-root", r"\brm\s+(-[rf]+\s+)?/"),
        rule("rm-wildcard", r"\brm\s+-[rf]*\s+\*"),
        rule("reboot", r"\breboot\b"),
        rule("shutdown", r"\bshutdown\b"),
        rule("init-runlevel", r"\binit\s+[0-6]\b"),
        rule("mkfs", r"\bmkfs\b"),
        rule("dd-device", r"\bdd\s+.*of=/dev/"),
        rule("redirect-disk", r"\b>\s*/dev/sd[a-z]"),
        rule("format", r"\bformat\b"),
        rule("fork-bomb", r":\(\)\s*\{\s*:\|:\s*&\s*\}\s*;\s*:"),
        rule("kill-all", r"\bkill\s+-9\s+-1\b"),
        rule("pkill-force", r"\bpkill\s+-9\b"),
        rule("halt", r"\bhalt\b"),
        rule("poweroff", r"\bpoweroff\b"),
    ];
}

fn rule(name: &'static str, pattern: &str) -> DangerRule {
    DangerRule {
        name,
        pattern: Regex::new(pattern).expect("danger rule must be a valid regex"),
    }
}

/// Stateless classifier for destructive shell commands
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandFilter;

impl CommandFilter {
    pub fn new() -> Self {
        Self
    }

    /// Returns true if the command matches any destructive rule.
    ///
    /// Matching is case-insensitive and ignores surrounding whitespace.
    pub fn is_dangerous(&self, command: &str) -> bool {
        self.matched_rule(command).is_some()
    }

    /// Name of the first rule the command trips, if any
    pub fn matched_rule(&self, command: &str) -> Option<&'static str> {
        let normalized = command.trim().to_lowercase();
        DANGER_RULES
            .iter()
            .find(|rule| rule.pattern.is_match(&normalized))
            .map(|rule| rule.name)
    }

    /// Names of every rule, in evaluation order
    pub fn rule_names(&self) -> Vec<&'static str> {
        DANGER_RULES.iter().map(|rule| rule.name).collect()
    }
}

/// Convenience wrapper around [`CommandFilter::is_dangerous`]
pub fn is_dangerous(command: &str) -> bool {
    CommandFilter.is_dangerous(command)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_destructive_commands_are_blocked() {
        let dangerous = [
            "rm -rf /",
            "rm -rf /var/lib/mysql",
            "rm -f *",
            "rm -rf *",
            "reboot",
            "sudo reboot now",
            "shutdown -h now",
            "init 0",
            "init 6",
            "mkfs.ext4 /dev/sdb1",
            "mkfs -t xfs /dev/sdc",
            "dd if=/dev/zero of=/dev/sda bs=1M",
            "echo garbage>/dev/sda",
            "format c:",
            ":(){ :|:& };:",
            ":(){:|:&};:",
            "kill -9 -1",
            "pkill -9 nginx",
            "halt",
            "systemctl poweroff",
        ];

        for cmd in dangerous {
            assert!(is_dangerous(cmd), "expected '{}' to be blocked", cmd);
        }
    }

    #[test]
    fn test_safe_commands_pass() {
        let safe = [
            "df -h",
            "free -m",
            "tail -100 /var/log/syslog",
            "ps aux --sort=-%mem | head -20",
            "systemctl status nginx",
            "journalctl -u nginx --since '1 hour ago'",
            "ls -la /var/log",
            "kill -9 12345",
            "du -sh /var/* 2>/dev/null",
        ];

        for cmd in safe {
            assert!(!is_dangerous(cmd), "expected '{}' to pass", cmd);
        }
    }

    #[test]
    fn test_matching_is_case_insensitive_and_trimmed() {
        assert!(is_dangerous("REBOOT"));
        assert!(is_dangerous("   Rm -RF /   "));
        assert!(is_dangerous("\tPoWeRoFf\n"));
    }

    #[test]
    fn test_matched_rule_names() {
        let filter = CommandFilter::new();
        assert_eq!(filter.matched_rule("rm -rf /"), Some("rm-root"));
        assert_eq!(filter.matched_rule("dd if=/dev/urandom of=/dev/nvme0n1"), Some("dd-device"));
        assert_eq!(filter.matched_rule("uptime"), None);
    }

    #[test]
    fn test_known_false_positives() {
        // Pattern-based: deleting any absolute path and the bare word "format"
        // are treated as destructive.
        assert!(is_dangerous("rm /tmp/stale.lock"));
        assert!(is_dangerous("grep -i format /etc/fstab"));
    }

    #[test]
    fn test_known_false_negatives() {
        assert!(!is_dangerous("find / -delete"));
        assert!(!is_dangerous("echo garbage > /dev/sda"));
    }

    #[test]
    fn test_rule_order_is_stable() {
        let names = CommandFilter::new().rule_names();
        assert_eq!(names.len(), 14);
        assert_eq!(names.first(), Some(&"rm-root"));
        assert_eq!(names.last(), Some(&"poweroff"));
    }
}
