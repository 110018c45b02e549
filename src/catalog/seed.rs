//! System-seeded analysts and strategies
//!
//! Seeding is idempotent: existing slugs are left untouched.

use chrono::Utc;
use std::collections::HashMap;

use super::{Analyst, CatalogStore, RiskLevel, Strategy, Thresholds, TierInstructions};
use crate::error::Result;
use crate::storage::DocFilter;
use crate::types::{new_id, ScopeLevel};

struct SeedAnalyst {
    slug: &'static str,
    name: &'static str,
    perspective: &'static str,
    weight: f64,
}

const SEED_ANALYSTS: [SeedAnalyst; 4] = [
    SeedAnalyst {
        slug: "momentum",
        name: "Momentum Analyst",
        perspective: "Weighs recency and acceleration of directional claims",
        weight: 1.0,
    },
    SeedAnalyst {
        slug: "contrarian",
        name: "Contrarian Analyst",
        perspective: "Looks for crowded narratives likely to mean-revert",
        weight: 0.8,
    },
    SeedAnalyst {
        slug: "fundamentals",
        name: "Fundamentals Analyst",
        perspective: "Scores claims against underlying business substance",
        weight: 1.2,
    },
    SeedAnalyst {
        slug: "risk",
        name: "Risk Analyst",
        perspective: "Focuses on downside scenarios and claim reliability",
        weight: 1.0,
    },
];

pub async fn seed_system_analysts(catalog: &CatalogStore, org: &str) -> Result<u32> {
    let mut created = 0;
    for seed in SEED_ANALYSTS {
        if catalog.get_analyst_by_slug(org, seed.slug).await?.is_some() {
            continue;
        }
        let analyst = Analyst {
            id: new_id(),
            organization_slug: org.to_string(),
            slug: seed.slug.to_string(),
            name: seed.name.to_string(),
            scope_level: ScopeLevel::Runner,
            universe_id: None,
            target_id: None,
            perspective: seed.perspective.to_string(),
            tier_instructions: TierInstructions {
                gold: format!("{}. Be thorough and cite the strongest evidence.", seed.perspective),
                silver: format!("{}. Be concise.", seed.perspective),
                bronze: format!("{}. One-line judgment only.", seed.perspective),
            },
            default_weight: seed.weight,
            is_enabled: true,
            is_system: true,
            created_at: Utc::now(),
        };
        catalog.db().put(&analyst).await?;
        created += 1;
    }
    Ok(created)
}

pub async fn seed_system_strategies(catalog: &CatalogStore, org: &str) -> Result<u32> {
    let seeds = [
        (
            "cautious",
            "Cautious",
            RiskLevel::Conservative,
            Thresholds {
                min_predictors: 4,
                min_combined_strength: 0.75,
            },
        ),
        (
            "balanced",
            "Balanced",
            RiskLevel::Balanced,
            Thresholds {
                min_predictors: 3,
                min_combined_strength: 0.6,
            },
        ),
        (
            "aggressive",
            "Aggressive",
            RiskLevel::Aggressive,
            Thresholds {
                min_predictors: 2,
                min_combined_strength: 0.45,
            },
        ),
    ];
    let mut created = 0;
    for (slug, name, risk_level, thresholds) in seeds {
        let existing: Vec<Strategy> = catalog
            .db()
            .list(org, &DocFilter::default().key(slug).limit(1))
            .await?;
        if !existing.is_empty() {
            continue;
        }
        let strategy = Strategy {
            id: new_id(),
            organization_slug: org.to_string(),
            slug: slug.to_string(),
            name: name.to_string(),
            thresholds,
            analyst_weights: HashMap::new(),
            risk_level,
            is_system: true,
            created_at: Utc::now(),
        };
        catalog.put_strategy(&strategy).await?;
        created += 1;
    }
    Ok(created)
}
