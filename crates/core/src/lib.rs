pub mod audit;
pub mod backtester;
pub mod config;
pub mod domain;
pub mod engine;
pub mod errors;
pub mod rules;
pub mod simulator;
pub mod stores;
pub mod workflow;

pub use audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink, InMemoryAuditSink};
pub use backtester::{
    BacktestPeriod, BacktestReport, BacktestRequest, BacktestSummary, Backtester,
    BacktesterSettings, RiskAnalysis, RuleBacktest,
};
pub use config::{
    AppConfig, ConfigError, ConfigOverrides, DatabaseConfig, EngineConfig, LoadOptions, LogFormat,
    LoggingConfig, SafetyConfig,
};
pub use domain::listing::{Facts, Listing, ListingId, PriceChangeLogEntry, PriceHistoryPoint};
pub use domain::recommendation::{
    change_percent, Recommendation, RecommendationId, RecommendationStatus,
};
pub use domain::rule::{Action, Condition, PricingRule, RuleDraft, RuleId, RuleUpdate};
pub use engine::{
    ImpactEstimate, Proposal, RiskLevel, RuleEngine, SafetyBounds, SafetyOverrides, SafetyVerdict,
    SafetyViolation, TrailEntry,
};
pub use errors::{DomainError, ServiceError};
pub use rules::RuleCatalog;
pub use simulator::{
    BatchSimulation, BatchSimulationEntry, BatchSummary, Simulator, SimulatorSettings,
};
pub use stores::{
    ChangeLogStore, InMemoryChangeLogStore, InMemoryListingStore, InMemoryPriceHistoryStore,
    InMemoryRecommendationStore, InMemoryRuleStore, ListingStore, Page, PriceHistoryStore,
    RecommendationFilter, RecommendationStore, RuleStore, StatusChange, StoreError, TimeWindow,
};
pub use workflow::{
    ListingSummary, RecommendationDetail, RecommendationListItem, RecommendationPage,
    RecommendationWorkflow, WorkflowStats,
};
