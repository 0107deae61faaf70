//! Query intent classification.
//!
//! Maps a raw query string to one of a closed set of intent categories by
//! substring matching against bilingual (Chinese + English) keyword lists.
//! Classification is a total function: unmatched queries fall back to
//! [`QueryIntent::General`].

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryIntent {
    Configuration,
    Performance,
    Comparison,
    VersionRelease,
    ConceptLearning,
    General,
}

impl QueryIntent {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryIntent::Configuration => "configuration",
            QueryIntent::Performance => "performance",
            QueryIntent::Comparison => "comparison",
            QueryIntent::VersionRelease => "version_release",
            QueryIntent::ConceptLearning => "concept_learning",
            QueryIntent::General => "general",
        }
    }
}

impl std::fmt::Display for QueryIntent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered rule table: the first category whose keyword set matches wins.
/// The evaluation order is load-bearing; downstream score adjustments are
/// tuned against it. Keep as data so the precedence is testable on its own.
const INTENT_RULES: &[(QueryIntent, &[&str])] = &[
    (
        QueryIntent::Configuration,
        &[
            "配置",
            "config",
            "设置",
            "setting",
            "选项",
            "option",
            "vite.config",
            "alias",
            "别名",
            "代理",
            "proxy",
            "环境变量",
        ],
    ),
    (
        QueryIntent::Performance,
        &[
            "性能",
            "performance",
            "优化",
            "optimization",
            "seo",
            "速度",
            "speed",
            "快",
            "fast",
        ],
    ),
    (
        QueryIntent::Comparison,
        &[
            "对比", "比较", "差异", "区别", "vs", "versus", "差别", "difference",
        ],
    ),
    (
        QueryIntent::VersionRelease,
        &[
            "版本",
            "version",
            "发布",
            "release",
            "更新",
            "update",
            "announcing",
            "新特性",
            "feature",
            "变更",
            "change",
        ],
    ),
    (
        QueryIntent::ConceptLearning,
        &[
            "是什么",
            "什么是",
            "what is",
            "如何",
            "how",
            "为什么",
            "why",
            "原理",
            "principle",
            "机制",
            "mechanism",
        ],
    ),
];

/// Classify a query into an intent category. Never fails.
pub fn classify(query: &str) -> QueryIntent {
    let query_lower = query.to_lowercase();
    for (intent, keywords) in INTENT_RULES {
        if keywords.iter().any(|kw| query_lower.contains(kw)) {
            return *intent;
        }
    }
    QueryIntent::General
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_keywords() {
        assert_eq!(classify("how do I set up a proxy?"), QueryIntent::Configuration);
        assert_eq!(classify("vite.config 别名设置"), QueryIntent::Configuration);
    }

    #[test]
    fn performance_keywords() {
        assert_eq!(classify("improve build speed"), QueryIntent::Performance);
        assert_eq!(classify("SEO 优化建议"), QueryIntent::Performance);
    }

    #[test]
    fn comparison_keywords() {
        assert_eq!(classify("webpack vs vite"), QueryIntent::Comparison);
        assert_eq!(classify("两者的区别"), QueryIntent::Comparison);
    }

    #[test]
    fn version_keywords() {
        assert_eq!(classify("announcing v5"), QueryIntent::VersionRelease);
        assert_eq!(classify("最新版本有哪些新特性"), QueryIntent::VersionRelease);
    }

    #[test]
    fn concept_keywords() {
        assert_eq!(classify("what is hot module replacement"), QueryIntent::ConceptLearning);
        assert_eq!(classify("HMR 的原理"), QueryIntent::ConceptLearning);
    }

    #[test]
    fn unmatched_falls_back_to_general() {
        assert_eq!(classify("hello there"), QueryIntent::General);
        assert_eq!(classify(""), QueryIntent::General);
    }

    #[test]
    fn case_insensitive() {
        assert_eq!(classify("PROXY Setup"), QueryIntent::Configuration);
    }

    #[test]
    fn precedence_is_fixed() {
        // Matches both configuration and version_release keyword sets;
        // configuration is evaluated first.
        assert_eq!(classify("配置 vs 版本发布"), QueryIntent::Configuration);
        // Matches performance and version_release; performance wins.
        assert_eq!(classify("performance changes in the new update"), QueryIntent::Performance);
        // Matches comparison and version_release; comparison wins.
        assert_eq!(classify("difference between releases"), QueryIntent::Comparison);
    }
}
