//! Declarative boilerplate rules.
//!
//! A [`RuleSet`] is an immutable, versioned, ordered list of [`FilterRule`]s.
//! Adding a rule never mutates a set in place: [`RuleSet::with_rule`] returns a
//! new snapshot, and [`RuleRegistry`] swaps whole snapshots under a
//! reader-writer lock so requests already running keep the tables they began
//! with.

use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};

/// What to do with a node matched by a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    /// Detach the node and its subtree.
    Remove,
    /// Replace the node with its children, preserving their order.
    Unwrap,
}

/// A single selector-based boilerplate rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FilterRule {
    /// Human-readable reason for the rule
    pub description: String,
    /// CSS selector matched against the current tree
    pub selector: String,
    /// Remove or unwrap
    pub action: RuleAction,
}

impl FilterRule {
    /// Creates a rule that removes every match.
    pub fn remove(description: &str, selector: &str) -> Self {
        Self { description: description.to_string(), selector: selector.to_string(), action: RuleAction::Remove }
    }

    /// Creates a rule that unwraps every match.
    pub fn unwrap(description: &str, selector: &str) -> Self {
        Self { description: description.to_string(), selector: selector.to_string(), action: RuleAction::Unwrap }
    }
}

/// An ordered, immutable rule snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleSet {
    name: String,
    version: u64,
    rules: Arc<[FilterRule]>,
}

impl RuleSet {
    /// Creates a version-1 rule set.
    pub fn new(name: &str, rules: Vec<FilterRule>) -> Self {
        Self { name: name.to_string(), version: 1, rules: rules.into() }
    }

    /// Set name (`safe`, `aggressive`, or a custom name).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Snapshot version; bumped by every [`RuleSet::with_rule`].
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Rules in application order.
    pub fn rules(&self) -> &[FilterRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Returns a new snapshot with `rule` appended.
    pub fn with_rule(&self, rule: FilterRule) -> Self {
        let mut rules = self.rules.to_vec();
        rules.push(rule);
        Self { name: self.name.clone(), version: self.version + 1, rules: rules.into() }
    }

    /// Conservative rules applied to every document.
    ///
    /// Only unambiguous page chrome: navigation, ads, consent banners, social
    /// widgets, page-level footers and known site furniture.
    pub fn safe() -> Self {
        Self::new(
            "safe",
            vec![
                FilterRule::unwrap("presentational wrappers", "font, center"),
                FilterRule::remove("scripts and styles", "script, style, noscript, template, link[rel=stylesheet]"),
                FilterRule::remove("navigation", "nav, [role=navigation], menu"),
                FilterRule::remove(
                    "advertising",
                    ".ad, .ads, .advert, .advertisement, .ad-container, .ad-slot, ins.adsbygoogle, \
                     [id^=google_ads], [id^=div-gpt-ad], [class*=sponsored-content], [data-ad-slot]",
                ),
                FilterRule::remove(
                    "cookie and consent banners",
                    "#onetrust-consent-sdk, #onetrust-banner-sdk, #CybotCookiebotDialog, .cc-window, \
                     [class*=cookie-banner], [class*=cookie-consent], [class*=cookie-notice], [id*=cookie-banner], \
                     [id*=cookie-consent], [id*=cookie-notice], [class*=gdpr], [aria-label*=cookie i]",
                ),
                FilterRule::remove(
                    "social widgets",
                    ".share-buttons, .social-share, .social-links, .sharing, .sharedaddy, .addthis_toolbox, \
                     [class*=share-bar], [class*=social-icons]",
                ),
                FilterRule::remove("page footer", "body > footer, [role=contentinfo]"),
                FilterRule::remove("skip links", ".skip-link, .skip-to-content, a[href='#main-content']"),
                FilterRule::remove(
                    "known site chrome",
                    "#wpadminbar, .mw-editsection, .mw-jump-link, sup.reference, span.cite-bracket, \
                     .printfooter, #catlinks, .navbox",
                ),
            ],
        )
    }

    /// Heavier rules applied only to technical pages.
    ///
    /// Documentation sites wrap code in sidebars, tables of contents, copy
    /// buttons and heading anchors; these are stripped before heuristic
    /// extraction.
    pub fn aggressive() -> Self {
        Self::new(
            "aggressive",
            vec![
                FilterRule::remove("complementary regions", "aside, [role=complementary], [role=banner]"),
                FilterRule::remove("page header and footer", "header, footer"),
                FilterRule::remove("forms and controls", "form, button, input, select, textarea"),
                FilterRule::remove(
                    "sidebars",
                    "[class*=sidebar], [id*=sidebar], [class*=sidenav], [class*=side-nav]",
                ),
                FilterRule::remove(
                    "tables of contents",
                    ".toc, #toc, [class*=table-of-contents], [class*=on-this-page], [class*=page-toc]",
                ),
                FilterRule::remove("breadcrumbs", "[class*=breadcrumb], [id*=breadcrumb], [aria-label=breadcrumb i]"),
                FilterRule::remove("pagination", ".pagination, .pager, [class*=page-nav], [class*=prev-next]"),
                FilterRule::remove("related content", "[class*=related], [id*=related]"),
                FilterRule::remove("comment sections", "#comments, .comments, #disqus_thread, [class*=comment-list]"),
                FilterRule::remove(
                    "edit links",
                    "[class*=edit-this-page], [class*=edit-on-github], [class*=edit-page], a[href*='/edit/']",
                ),
                FilterRule::remove(
                    "copy buttons",
                    "[class*=copy-button], [class*=copy-code], [class*=clipboard], [data-clipboard-target]",
                ),
                FilterRule::remove("heading anchors", "a.headerlink, a.anchor, a.anchorjs-link, a.heading-anchor"),
            ],
        )
    }
}

/// The pair of rule sets used by one extraction request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleTables {
    pub safe: RuleSet,
    pub aggressive: RuleSet,
}

impl Default for RuleTables {
    fn default() -> Self {
        Self { safe: RuleSet::safe(), aggressive: RuleSet::aggressive() }
    }
}

/// Which table a custom rule is added to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleTable {
    Safe,
    Aggressive,
}

/// Shared holder of the current rule tables.
///
/// Readers take a cheap `Arc` snapshot; writers build a new snapshot and swap
/// it in. Nothing is mutated in place.
#[derive(Debug, Default)]
pub struct RuleRegistry {
    current: RwLock<Arc<RuleTables>>,
}

impl RuleRegistry {
    pub fn new(tables: RuleTables) -> Self {
        Self { current: RwLock::new(Arc::new(tables)) }
    }

    /// The tables in effect right now.
    pub fn snapshot(&self) -> Arc<RuleTables> {
        let guard = self.current.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    /// Appends a custom rule, publishing a new snapshot.
    ///
    /// Returns the new version of the table that was extended.
    pub fn add_custom_rule(&self, table: RuleTable, rule: FilterRule) -> u64 {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = RuleTables::clone(&guard);
        let version = match table {
            RuleTable::Safe => {
                next.safe = next.safe.with_rule(rule);
                next.safe.version()
            }
            RuleTable::Aggressive => {
                next.aggressive = next.aggressive.with_rule(rule);
                next.aggressive.version()
            }
        };
        tracing::debug!(?table, version, "published new rule snapshot");
        *guard = Arc::new(next);
        version
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::compile_selector;

    #[test]
    fn test_builtin_selectors_compile() {
        for set in [RuleSet::safe(), RuleSet::aggressive()] {
            for rule in set.rules() {
                assert!(
                    compile_selector(&rule.selector).is_ok(),
                    "{} rule '{}' has a bad selector",
                    set.name(),
                    rule.description
                );
            }
        }
    }

    #[test]
    fn test_with_rule_creates_new_snapshot() {
        let base = RuleSet::safe();
        let extended = base.with_rule(FilterRule::remove("promo", ".promo"));

        assert_eq!(extended.len(), base.len() + 1);
        assert_eq!(extended.version(), base.version() + 1);
        assert_eq!(extended.rules().last().unwrap().selector, ".promo");
        assert!(!base.rules().iter().any(|r| r.selector == ".promo"));
    }

    #[test]
    fn test_registry_snapshot_isolation() {
        let registry = RuleRegistry::new(RuleTables::default());
        let before = registry.snapshot();

        let version = registry.add_custom_rule(RuleTable::Aggressive, FilterRule::remove("promo", ".promo"));
        let after = registry.snapshot();

        assert_eq!(version, 2);
        assert_eq!(before.aggressive.version(), 1);
        assert_eq!(after.aggressive.len(), before.aggressive.len() + 1);
        assert_eq!(after.safe, before.safe);
    }

    #[test]
    fn test_rule_deserialize_rejects_unknown_fields() {
        let ok = r#"{"description": "promo", "selector": ".promo", "action": "unwrap"}"#;
        let rule: FilterRule = serde_json::from_str(ok).unwrap();
        assert_eq!(rule.action, RuleAction::Unwrap);

        let bad = r#"{"description": "promo", "selector": ".promo", "action": "remove", "priority": 3}"#;
        assert!(serde_json::from_str::<FilterRule>(bad).is_err());
    }
}
