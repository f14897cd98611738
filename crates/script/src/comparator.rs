//! Deterministic product scoring and ranking for the ScriptPipeline.

use std::collections::HashMap;

use chrono::Utc;

use sa_domain::model::{Priority, ProductProjection, Script, ScriptProduct};

const PRIORITY_ALTA: i32 = 25;
const PRIORITY_MEDIA: i32 = 15;
const PRIORITY_BAJA: i32 = 5;

#[derive(Debug, Clone)]
pub struct ScoredProduct {
    pub product: ProductProjection,
    pub score: i32,
    pub reasons: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct RankResult {
    pub ranked: Vec<ScoredProduct>,
    pub best_id: String,
    pub reasoning: String,
}

/// Score and rank `projections` against a script's products and
/// preferences. `projections` is assumed non-empty.
pub fn rank(projections: Vec<ProductProjection>, script: &Script) -> RankResult {
    let by_barcode: HashMap<&str, &ScriptProduct> = script
        .products
        .iter()
        .filter_map(|p| Some((p.barcode.as_str(), p)))
        .collect();

    let mut scored: Vec<ScoredProduct> = projections
        .into_iter()
        .map(|product| score_one(product, &by_barcode, script))
        .collect();

    scored.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then_with(|| {
                a.product
                    .final_price
                    .partial_cmp(&b.product.final_price)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .then_with(|| a.product.name.cmp(&b.product.name))
    });

    let best_id = scored.first().map(|s| s.product.id.clone()).unwrap_or_default();
    let reasoning = build_reasoning(&scored);

    RankResult {
        ranked: scored,
        best_id,
        reasoning,
    }
}

fn score_one(
    product: ProductProjection,
    by_barcode: &HashMap<&str, &ScriptProduct>,
    script: &Script,
) -> ScoredProduct {
    let mut score: i32 = 0;
    let mut reasons = Vec::new();

    let priority = product
        .barcode
        .as_deref()
        .and_then(|b| by_barcode.get(b))
        .map(|sp| sp.priority)
        .unwrap_or(Priority::Media);
    score += match priority {
        Priority::Alta => PRIORITY_ALTA,
        Priority::Media => PRIORITY_MEDIA,
        Priority::Baja => PRIORITY_BAJA,
    };

    match script.preferences.budget_max {
        Some(budget) if product.final_price <= budget => score += 25,
        Some(budget) if product.final_price <= budget * 1.1 => score += 15,
        Some(_) => score += 5,
        None => score += 15,
    }

    let now = Utc::now();
    let on_sale = product.discount_percent.is_some() || product.promotion_text.is_some();
    if on_sale && product.promotion_is_valid(now) {
        score += 20;
        if let Some(text) = &product.promotion_text {
            reasons.push(text.clone());
        }
    } else if on_sale {
        score += 15;
    }

    match product.available {
        n if n > 10 => score += 15,
        6..=10 => {
            score += 10;
            reasons.push("disponibilidad limitada".into());
        }
        1..=5 => {
            score += 5;
            reasons.push(format!("solo quedan {}", product.available));
        }
        0 => score -= 20,
        _ => {}
    }

    if let Some(use_case) = script.preferences.intended_use.as_deref() {
        let use_lower = use_case.to_lowercase();
        let category = product.category.as_deref().unwrap_or("").to_lowercase();
        let hit = if ["correr", "maratón", "maraton", "running"]
            .iter()
            .any(|k| use_lower.contains(k))
        {
            if category.contains("run") {
                Some(15)
            } else if category.contains("train") {
                Some(8)
            } else {
                None
            }
        } else if ["gym", "gimnasio"].iter().any(|k| use_lower.contains(k)) {
            if category.contains("train") || category.contains("gym") {
                Some(15)
            } else {
                None
            }
        } else if ["casual", "caminar"].iter().any(|k| use_lower.contains(k)) {
            if category.contains("life") || category.contains("casual") {
                Some(15)
            } else {
                None
            }
        } else {
            None
        };
        if let Some(points) = hit {
            score += points;
        }
    }

    if let Some(color) = script.preferences.preferred_color.as_deref() {
        if product.name.to_lowercase().contains(&color.to_lowercase()) {
            score += 5;
        }
    }

    if script.preferences.preferred_size.is_some() {
        score += 5;
    }

    ScoredProduct {
        product,
        score: score.clamp(0, 100),
        reasons,
    }
}

fn build_reasoning(scored: &[ScoredProduct]) -> String {
    let Some(best) = scored.first() else {
        return String::new();
    };

    let reasons = best
        .reasons
        .iter()
        .take(3)
        .cloned()
        .collect::<Vec<_>>()
        .join(", ");

    let mut sentence = format!(
        "{} es la mejor opción a ${:.2}",
        best.product.name, best.product.final_price
    );
    if !reasons.is_empty() {
        sentence.push_str(&format!(" ({reasons})"));
    }

    if let Some(second) = scored.get(1) {
        let savings = second.product.final_price - best.product.final_price;
        if savings > 0.0 {
            sentence.push_str(&format!(
                ", ahorras ${savings:.2} frente a {}",
                second.product.name
            ));
        }
    }

    if best.product.available <= 5 && best.product.available > 0 {
        sentence.push_str(&format!(" — solo quedan {} unidades", best.product.available));
    }

    sentence
}

#[cfg(test)]
mod tests {
    use super::*;
    use sa_domain::model::{InputKind, Priority, PrimaryIntent, ScriptContext, ScriptPreferences, Style};

    fn product(id: &str, barcode: &str, price: f64, available: u32) -> ProductProjection {
        ProductProjection {
            id: id.into(),
            name: format!("Producto {id}"),
            barcode: Some(barcode.into()),
            brand: None,
            category: Some("running".into()),
            unit_price: price,
            final_price: price,
            discount_percent: None,
            promotion_text: None,
            promotion_valid_until: None,
            available,
            active: true,
            location: None,
        }
    }

    fn script_with(products: Vec<ScriptProduct>, budget_max: Option<f64>) -> Script {
        Script {
            session_id: "s1".into(),
            products,
            preferences: ScriptPreferences {
                style: Style::Cuencano,
                intended_use: None,
                activity_level: None,
                preferred_size: None,
                preferred_color: None,
                budget_max,
                wants_promos: true,
                urgency: Priority::Media,
                important_features: vec![],
            },
            context: ScriptContext {
                input_kind: InputKind::Text,
                explicit_product: None,
                needs_recommendation: true,
                primary_intent: PrimaryIntent::Recommend,
                extra_constraints: vec![],
            },
            original_text: "".into(),
            summary: "".into(),
            confidence: 0.9,
        }
    }

    #[test]
    fn best_id_matches_first_ranked_element() {
        let mut a = product("a", "X", 104.0, 8);
        a.discount_percent = Some(15.0);
        a.promotion_text = Some("15% off".into());
        let b = product("b", "Y", 120.0, 20);

        let script = script_with(
            vec![
                ScriptProduct {
                    barcode: "X".into(),
                    detected_name: "a".into(),
                    brand: None,
                    category: None,
                    priority: Priority::Alta,
                    reason_text: "".into(),
                },
                ScriptProduct {
                    barcode: "Y".into(),
                    detected_name: "b".into(),
                    brand: None,
                    category: None,
                    priority: Priority::Media,
                    reason_text: "".into(),
                },
            ],
            Some(150.0),
        );

        let result = rank(vec![a, b], &script);
        assert_eq!(result.best_id, result.ranked[0].product.id);
        assert_eq!(result.best_id, "a");
    }

    #[test]
    fn budget_exactly_met_scores_full_twentyfive() {
        let product = product("a", "X", 100.0, 20);
        let script = script_with(
            vec![ScriptProduct {
                barcode: "X".into(),
                detected_name: "a".into(),
                brand: None,
                category: None,
                priority: Priority::Baja,
                reason_text: "".into(),
            }],
            Some(100.0),
        );
        let result = rank(vec![product], &script);
        // priority baja(5) + budget(25) + no promo(0) + stock>10(15) = 45
        assert_eq!(result.ranked[0].score, 45);
    }

    #[test]
    fn stock_exactly_five_triggers_only_n_left_reason() {
        let product = product("a", "X", 50.0, 5);
        let script = script_with(
            vec![ScriptProduct {
                barcode: "X".into(),
                detected_name: "a".into(),
                brand: None,
                category: None,
                priority: Priority::Baja,
                reason_text: "".into(),
            }],
            None,
        );
        let result = rank(vec![product], &script);
        assert!(result.ranked[0].reasons.iter().any(|r| r.contains("5")));
    }
}
