use async_graphql::{Context, Object, Result as GraphQLResult, Schema, EmptySubscription};
use crate::analysis::AnalysisService;
use crate::error::EngineResult;
use crate::graphql::types::*;

pub type GraphQLSchema = Schema<QueryRoot, MutationRoot, EmptySubscription>;

/// Build the schema with the service every resolver reads from.
pub fn build_schema(service: AnalysisService) -> GraphQLSchema {
    Schema::build(QueryRoot, MutationRoot, EmptySubscription)
        .data(service)
        .finish()
}

/// Lookups answer `null` for unknown ids instead of an error.
fn optional<T>(result: EngineResult<T>) -> GraphQLResult<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub struct QueryRoot;

#[Object]
impl QueryRoot {
    /// Page through stored attack paths, optionally for one analysis
    async fn attack_paths(
        &self,
        ctx: &Context<'_>,
        page: Option<PageInput>,
    ) -> GraphQLResult<AttackPathPage> {
        let service = ctx.data::<AnalysisService>()?;
        let page = page.unwrap_or(PageInput {
            analysis_id: None,
            skip: None,
            limit: None,
        });
        let paths = service.get_paths(page.analysis_id.as_deref(), page.skip(), page.limit())?;
        Ok(AttackPathPage::from(paths))
    }

    async fn attack_path(&self, ctx: &Context<'_>, id: String) -> GraphQLResult<Option<AttackPathType>> {
        let service = ctx.data::<AnalysisService>()?;
        Ok(optional(service.get_path(&id))?.map(AttackPathType::from))
    }

    /// Page through stored attack chains, optionally for one analysis
    async fn attack_chains(
        &self,
        ctx: &Context<'_>,
        page: Option<PageInput>,
    ) -> GraphQLResult<AttackChainPage> {
        let service = ctx.data::<AnalysisService>()?;
        let page = page.unwrap_or(PageInput {
            analysis_id: None,
            skip: None,
            limit: None,
        });
        let chains = service.get_chains(page.analysis_id.as_deref(), page.skip(), page.limit())?;
        Ok(AttackChainPage::from(chains))
    }

    async fn attack_chain(&self, ctx: &Context<'_>, id: String) -> GraphQLResult<Option<AttackChainType>> {
        let service = ctx.data::<AnalysisService>()?;
        Ok(optional(service.get_chain(&id))?.map(AttackChainType::from))
    }

    async fn risk_frameworks(&self, ctx: &Context<'_>) -> GraphQLResult<Vec<RiskFrameworkType>> {
        let service = ctx.data::<AnalysisService>()?;
        let frameworks = service.frameworks().list()?;
        Ok(frameworks.into_iter().map(RiskFrameworkType::from).collect())
    }

    async fn risk_framework(&self, ctx: &Context<'_>, id: String) -> GraphQLResult<Option<RiskFrameworkType>> {
        let service = ctx.data::<AnalysisService>()?;
        Ok(optional(service.frameworks().get(&id))?.map(RiskFrameworkType::from))
    }

    /// The framework new analyses are scored against
    async fn active_risk_framework(&self, ctx: &Context<'_>) -> GraphQLResult<RiskFrameworkType> {
        let service = ctx.data::<AnalysisService>()?;
        let active = service.frameworks().active();
        Ok(RiskFrameworkType::from(active.as_ref().clone()))
    }
}

pub struct MutationRoot;

#[Object]
impl MutationRoot {
    /// Make a framework the only active one
    async fn set_active_risk_framework(
        &self,
        ctx: &Context<'_>,
        id: String,
    ) -> GraphQLResult<RiskFrameworkType> {
        let service = ctx.data::<AnalysisService>()?;
        let framework = service.frameworks().set_active(&id)?;
        Ok(RiskFrameworkType::from(framework))
    }
}
