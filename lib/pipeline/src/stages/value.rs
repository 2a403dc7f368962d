use super::{require_output, require_title, Stage};
use crate::context::{AgentOutput, PipelineRequest, PriceBracket, StageContext, StageData, StageName};
use crate::error::Result;
use async_trait::async_trait;

const POSITIVE_REVIEW_WORDS: &[&str] = &["good", "excellent", "great", "love", "durable", "high quality", "amazing"];
const PREMIUM_FEATURE_WORDS: &[&str] = &["premium", "pro", "plus", "metal", "advanced"];

#[derive(Debug, Clone, PartialEq)]
pub struct ValueAssessment {
    pub assessment: String,
    pub score: u8,
    pub price_bracket: PriceBracket,
}

/// Keywords match anywhere in the lowercased text, including inside longer words.
fn mentions(text: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|keyword| text.contains(keyword))
}

/// Rule-based value-for-money verdict from price, review text and features.
pub fn assess_value(price: f64, review_text: &str, product_features: &str) -> ValueAssessment {
    let mut score = 0u8;

    let reviews = review_text.to_lowercase();
    if mentions(&reviews, POSITIVE_REVIEW_WORDS) {
        score += 1;
    }

    let features = product_features.to_lowercase();
    if mentions(&features, PREMIUM_FEATURE_WORDS) {
        score += 1;
    }

    let (price_bracket, price_comment) = if price < 50.0 {
        score += 1;
        (PriceBracket::Affordable, "is very affordable.")
    } else if price < 150.0 {
        (PriceBracket::Moderate, "is in a moderate price range.")
    } else {
        (PriceBracket::Premium, "is a premium-priced item.")
    };

    let assessment = match score {
        3.. => format!(
            "Excellent value. The product {price_comment} and has highly positive feedback and features."
        ),
        2 => format!(
            "Good value. The product {price_comment} and shows positive signs in reviews or features."
        ),
        _ => format!(
            "Fair value. The product {price_comment} Consider if its specific features meet your needs."
        ),
    };

    ValueAssessment {
        assessment,
        score,
        price_bracket,
    }
}

pub struct ValueStage;

#[async_trait]
impl Stage for ValueStage {
    fn name(&self) -> StageName {
        StageName::Value
    }

    async fn run(&self, ctx: &StageContext, request: &PipelineRequest) -> Result<AgentOutput> {
        let title = require_title(ctx, StageName::Value)?;
        let retrieval = require_output(ctx, StageName::Value, StageName::Retrieval)?;

        let review_text = match &retrieval.data {
            StageData::Retrieval { top_products, .. } if !top_products.is_empty() => top_products
                .iter()
                .map(|hit| hit.entry.description.as_str())
                .collect::<Vec<_>>()
                .join(" "),
            _ => retrieval.message.clone(),
        };
        let features = match &ctx.identified_product.visual_summary {
            Some(summary) => format!("{title} {summary}"),
            None => title.to_string(),
        };

        let verdict = assess_value(request.price, &review_text, &features);
        Ok(AgentOutput::new(
            verdict.assessment.clone(),
            StageData::Value {
                assessment: verdict.assessment,
                score: verdict.score,
                price_bracket: verdict.price_bracket,
            },
        ))
    }

    fn apply(&self, ctx: &mut StageContext, output: &AgentOutput) {
        if let StageData::Value { assessment, .. } = &output.data {
            ctx.identified_product.value_assessment = Some(assessment.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StageError;

    #[test]
    fn test_excellent_value() {
        let v = assess_value(30.0, "Customers love it", "Premium metal body");
        assert_eq!(v.score, 3);
        assert_eq!(v.price_bracket, PriceBracket::Affordable);
        assert!(v.assessment.starts_with("Excellent value. The product is very affordable."));
    }

    #[test]
    fn test_good_value_in_moderate_bracket() {
        let v = assess_value(120.0, "Durable and great", "plastic");
        assert_eq!(v.score, 1);
        let v = assess_value(120.0, "Durable and great", "advanced grinder");
        assert_eq!(v.score, 2);
        assert_eq!(v.price_bracket, PriceBracket::Moderate);
        assert!(v.assessment.starts_with("Good value."));
    }

    #[test]
    fn test_keywords_match_inside_words() {
        assert!(mentions("the product was provided", &["pro"]));
        assert!(mentions("really high quality build", &["high quality"]));
        assert!(!mentions("high-quality build", &["high quality"]));

        let v = assess_value(100.0, "Goodness, what a product", "Professional espresso machine");
        assert_eq!(v.score, 2);
        assert!(v.assessment.starts_with("Good value. The product is in a moderate price range."));
    }

    #[test]
    fn test_fair_value_for_premium_price() {
        let v = assess_value(150.0, "meh", "basic");
        assert_eq!(v.score, 0);
        assert_eq!(v.price_bracket, PriceBracket::Premium);
        assert_eq!(
            v.assessment,
            "Fair value. The product is a premium-priced item. Consider if its specific features meet your needs."
        );
    }

    #[tokio::test]
    async fn test_requires_retrieval_output() {
        let request = PipelineRequest::text("kettle", 10.0, 20.0);
        let mut ctx = StageContext::new(&request);
        ctx.identified_product.title = Some("kettle".to_string());

        let err = ValueStage.run(&ctx, &request).await.unwrap_err();
        assert!(matches!(
            err,
            StageError::MissingPrerequisite { field: "agent_outputs.retrieval", .. }
        ));
    }
}
