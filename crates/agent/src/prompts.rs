//! Role copy and task instructions for the three stages.

use stockpilot_core::pipeline::StageKind;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StagePrompt {
    pub role: &'static str,
    pub goal: &'static str,
    pub backstory: &'static str,
    pub task: &'static str,
    pub expected_output: &'static str,
}

pub const ANALYST: StagePrompt = StagePrompt {
    role: "Inventory & Market Analyst",
    goal: "Watch ERP stock levels and competitor pricing, and surface items that are running \
           low or priced above the market.",
    backstory: "You have years of supply-chain and pricing experience. You read ERP extracts \
                and competitor price sheets and turn them into short reports a buyer can act on.",
    task: "Review the inventory rows and competitor price comparison below. The low-stock and \
           pricing findings have already been computed from the data; explain what they mean, \
           which ones need attention first, and note anything unusual in the data.",
    expected_output: "A concise analyst summary in plain prose (no more than a few paragraphs) \
                      covering stock risks, price positioning, and recommended focus areas.",
};

pub const STRATEGIST: StagePrompt = StagePrompt {
    role: "Business Strategist",
    goal: "Weigh each analyst finding against return on investment and choose between \
           restocking, running a discount campaign, or leaving it alone.",
    backstory: "You own profitability and inventory health. You consider reorder cost, margin \
                impact, and whether a price cut will actually move product before committing \
                to an action.",
    task: "Decide one action for every finding listed in the report. Allowed actions are \
           `reorder`, `discount_campaign`, and `no_action`. Reference findings only by the \
           exact `finding_ref` values given. For a reorder you may set `reorder_quantity`; for a \
           discount campaign you may set `proposed_price` (our new unit price).",
    expected_output: "Only a JSON object of the form {\"decisions\": [{\"finding_ref\": \"...\", \
                      \"action\": \"reorder|discount_campaign|no_action\", \"justification\": \
                      \"...\"}]} with one entry per finding, in the order the findings were listed. \
                      Add `reorder_quantity` (a positive integer) or `proposed_price` (a positive \
                      number) only when you choose a value.",
};

pub const EXECUTION_OFFICER: StagePrompt = StagePrompt {
    role: "Execution Officer",
    goal: "Carry out approved actions by writing supplier reorder requests and applying \
           price updates.",
    backstory: "You are the operations interface to suppliers and the product catalog. You \
                write short, accurate supplier emails and never act beyond what the strategy \
                approved.",
    task: "Write one supplier email for each reorder decision listed below. Keep each email \
           short and professional: name the product and SKU, the current and minimum stock, \
           and the quantity requested. Price updates are applied separately; do not mention \
           them.",
    expected_output: "Only a JSON object of the form {\"emails\": [{\"finding_ref\": \"...\", \
                      \"subject\": \"...\", \"body\": \"...\"}]} with one entry per reorder.",
};

impl StagePrompt {
    pub fn for_stage(stage: StageKind) -> Self {
        match stage {
            StageKind::Analyze => ANALYST,
            StageKind::Strategize => STRATEGIST,
            StageKind::Execute => EXECUTION_OFFICER,
        }
    }

    pub fn system(&self) -> String {
        format!(
            "You are the {role}.\n\nGoal: {goal}\n\n{backstory}\n\nRespond with: {expected}",
            role = self.role,
            goal = self.goal,
            backstory = self.backstory,
            expected = self.expected_output,
        )
    }

    /// Task text followed by labelled context sections, skipping empty ones.
    pub fn user(&self, sections: &[(&str, &str)]) -> String {
        let mut prompt = format!("Task: {}\n", self.task);
        for (label, body) in sections {
            if body.trim().is_empty() {
                continue;
            }
            prompt.push_str(&format!("\n## {label}\n{}\n", body.trim()));
        }
        prompt
    }
}

#[cfg(test)]
mod tests {
    use stockpilot_core::pipeline::StageKind;

    use super::{StagePrompt, STRATEGIST};

    #[test]
    fn system_prompt_carries_role_and_output_contract() {
        let system = StagePrompt::for_stage(StageKind::Strategize).system();

        assert!(system.starts_with("You are the Business Strategist."));
        assert!(system.contains("\"decisions\""));
        assert!(!system.contains("\"proposed_price\": 0"));
        assert!(!system.contains("\"reorder_quantity\": 0"));
    }

    #[test]
    fn empty_sections_are_skipped() {
        let prompt = STRATEGIST.user(&[("Analyst report", "{\"low_stock_items\":[]}"), ("Notes", "  ")]);

        assert!(prompt.contains("## Analyst report"));
        assert!(!prompt.contains("## Notes"));
    }
}
