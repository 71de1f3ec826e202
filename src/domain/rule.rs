//! Automation rule domain types.
//!
//! Rules are small declarative "if metrics match, take action" documents
//! edited by the rule builder and persisted as a whole-collection snapshot.
//! Nothing in this crate evaluates or schedules them.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A bid-automation rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomationRule {
    /// Opaque unique token.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Whether the rule is considered active. Stored state only.
    pub enabled: bool,
    /// When the rule is meant to run.
    #[serde(flatten)]
    pub schedule: Schedule,
    /// Ordered conditions; the first renders as WHEN, the rest as AND.
    pub conditions: Vec<Condition>,
    /// Ordered actions.
    pub actions: Vec<Action>,
}

/// Daily schedule attached to a rule.
///
/// Serialized flat into the rule (`trigger`/`intervalDays`/`timeOfDay`) to
/// match the persisted collection format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    pub trigger: Trigger,
    /// Run every N days; always positive.
    pub interval_days: u32,
    /// Local time of day in "HH:MM" form.
    pub time_of_day: String,
}

impl Default for Schedule {
    fn default() -> Self {
        Self {
            trigger: Trigger::Daily,
            interval_days: 1,
            time_of_day: "09:00".to_string(),
        }
    }
}

/// Rule trigger kind. Only daily scheduling exists today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    Daily,
}

/// Metric a condition inspects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Acos,
    Cpc,
    Clicks,
    Impressions,
    Spend,
    Orders,
}

impl Metric {
    /// Human-facing label, as shown in the builder's metric picker.
    pub fn label(&self) -> &'static str {
        match self {
            Metric::Acos => "ACOS (%)",
            Metric::Cpc => "CPC ($)",
            Metric::Clicks => "Clicks",
            Metric::Impressions => "Impressions",
            Metric::Spend => "Spend ($)",
            Metric::Orders => "Orders",
        }
    }
}

/// Comparison operator for a condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Gt,
    Lt,
    Eq,
    Gte,
    Lte,
}

impl Operator {
    /// Comparison symbol used for display.
    pub fn symbol(&self) -> &'static str {
        match self {
            Operator::Gt => ">",
            Operator::Lt => "<",
            Operator::Eq => "=",
            Operator::Gte => ">=",
            Operator::Lte => "<=",
        }
    }
}

/// A single metric comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub id: String,
    pub metric: Metric,
    pub operator: Operator,
    pub value: f64,
}

impl Condition {
    /// Creates a condition with a generated id.
    pub fn new(metric: Metric, operator: Operator, value: f64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            metric,
            operator,
            value,
        }
    }

    /// Display prefix for a condition at the given position: the first is
    /// "WHEN", every following one is "AND".
    pub fn position_label(index: usize) -> &'static str {
        if index == 0 {
            "WHEN"
        } else {
            "AND"
        }
    }
}

/// What a rule does when its conditions match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    IncreaseBid,
    DecreaseBid,
    SetBid,
    PauseKeyword,
    EnableKeyword,
    AddNegative,
}

impl ActionType {
    /// Whether this action carries a numeric value and unit. The two
    /// keyword-state actions do not.
    pub fn takes_value(&self) -> bool {
        !matches!(self, ActionType::PauseKeyword | ActionType::EnableKeyword)
    }

    /// Human-facing label, as shown in the builder's action picker.
    pub fn label(&self) -> &'static str {
        match self {
            ActionType::IncreaseBid => "Increase Bid",
            ActionType::DecreaseBid => "Decrease Bid",
            ActionType::SetBid => "Set Bid To",
            ActionType::PauseKeyword => "Pause Keyword",
            ActionType::EnableKeyword => "Enable Keyword",
            ActionType::AddNegative => "Add Negative KW",
        }
    }
}

/// A single rule action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub id: String,
    #[serde(rename = "type")]
    pub action_type: ActionType,
    /// `None` for keyword-state actions.
    pub value: Option<f64>,
    /// `None` for keyword-state actions; "%" otherwise.
    pub unit: Option<String>,
}

impl Action {
    /// Creates an action with a generated id. Value and unit are dropped for
    /// action types that do not take them.
    pub fn new(action_type: ActionType, value: Option<f64>, unit: Option<&str>) -> Self {
        let (value, unit) = if action_type.takes_value() {
            (value, unit.map(str::to_owned))
        } else {
            (None, None)
        };
        Self {
            id: Uuid::new_v4().to_string(),
            action_type,
            value,
            unit,
        }
    }
}

impl AutomationRule {
    /// Creates a new rule with the builder's defaults: disabled, daily at
    /// 09:00, one `acos > 30` condition and one `decrease bid 5%` action.
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: "New Automation Rule".to_string(),
            enabled: false,
            schedule: Schedule::default(),
            conditions: vec![Condition::new(Metric::Acos, Operator::Gt, 30.0)],
            actions: vec![Action::new(ActionType::DecreaseBid, Some(5.0), Some("%"))],
        }
    }

    /// Default condition appended by the editor's "add condition" control.
    pub fn default_condition() -> Condition {
        Condition::new(Metric::Acos, Operator::Gt, 0.0)
    }

    /// Default action appended by the editor's "add action" control.
    pub fn default_action() -> Action {
        Action::new(ActionType::IncreaseBid, Some(5.0), Some("%"))
    }

    /// Merges partial field updates into this rule.
    pub fn apply(&mut self, update: RuleUpdate) {
        if let Some(name) = update.name {
            self.name = name;
        }
        if let Some(enabled) = update.enabled {
            self.enabled = enabled;
        }
        if let Some(interval_days) = update.interval_days {
            self.schedule.interval_days = interval_days.max(1);
        }
        if let Some(time_of_day) = update.time_of_day {
            self.schedule.time_of_day = time_of_day;
        }
        if let Some(conditions) = update.conditions {
            self.conditions = conditions;
        }
        if let Some(actions) = update.actions {
            self.actions = actions;
        }
    }
}

impl Default for AutomationRule {
    fn default() -> Self {
        Self::new()
    }
}

/// Partial edit applied to a rule. Unset fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct RuleUpdate {
    pub name: Option<String>,
    pub enabled: Option<bool>,
    pub interval_days: Option<u32>,
    pub time_of_day: Option<String>,
    pub conditions: Option<Vec<Condition>>,
    pub actions: Option<Vec<Action>>,
}

/// The three built-in rules seeded on first use, with their original
/// fixture values.
pub fn templates() -> Vec<AutomationRule> {
    vec![
        AutomationRule {
            id: "tpl-1".to_string(),
            name: "High ACOS Bid Reducer".to_string(),
            enabled: true,
            schedule: Schedule {
                trigger: Trigger::Daily,
                interval_days: 1,
                time_of_day: "08:00".to_string(),
            },
            conditions: vec![
                Condition {
                    id: "c1".to_string(),
                    metric: Metric::Acos,
                    operator: Operator::Gt,
                    value: 30.0,
                },
                Condition {
                    id: "c2".to_string(),
                    metric: Metric::Clicks,
                    operator: Operator::Gt,
                    value: 10.0,
                },
            ],
            actions: vec![Action {
                id: "a1".to_string(),
                action_type: ActionType::DecreaseBid,
                value: Some(15.0),
                unit: Some("%".to_string()),
            }],
        },
        AutomationRule {
            id: "tpl-2".to_string(),
            name: "Bleeder Stopper".to_string(),
            enabled: true,
            schedule: Schedule {
                trigger: Trigger::Daily,
                interval_days: 1,
                time_of_day: "12:00".to_string(),
            },
            conditions: vec![
                Condition {
                    id: "c1".to_string(),
                    metric: Metric::Spend,
                    operator: Operator::Gt,
                    value: 20.0,
                },
                Condition {
                    id: "c2".to_string(),
                    metric: Metric::Orders,
                    operator: Operator::Eq,
                    value: 0.0,
                },
            ],
            actions: vec![Action {
                id: "a1".to_string(),
                action_type: ActionType::PauseKeyword,
                value: None,
                unit: None,
            }],
        },
        AutomationRule {
            id: "tpl-3".to_string(),
            name: "Winner Scaler".to_string(),
            enabled: false,
            schedule: Schedule {
                trigger: Trigger::Daily,
                interval_days: 1,
                time_of_day: "20:00".to_string(),
            },
            conditions: vec![
                Condition {
                    id: "c1".to_string(),
                    metric: Metric::Acos,
                    operator: Operator::Lt,
                    value: 15.0,
                },
                Condition {
                    id: "c2".to_string(),
                    metric: Metric::Orders,
                    operator: Operator::Gt,
                    value: 5.0,
                },
            ],
            actions: vec![Action {
                id: "a1".to_string(),
                action_type: ActionType::IncreaseBid,
                value: Some(10.0),
                unit: Some("%".to_string()),
            }],
        },
    ]
}
