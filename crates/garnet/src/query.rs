//! Query builder: rules in, pages of decoded instances out.

use garnet_query::{
    CompiledQuery, Order, PageToken, QueryPlan, Rule, Window, compile, cursor, plan,
};

use crate::error::{Error, Result};
use crate::model::Model;
use crate::store::Store;

// ============================================================================
// Page
// ============================================================================

/// One page of decoded records.
#[derive(Debug, Clone)]
pub struct Page<M> {
    /// Decoded instances in window order.
    pub items: Vec<M>,
    /// Continuation token, present only when more records may remain.
    pub next_token: Option<PageToken>,
}

// ============================================================================
// Query builder
// ============================================================================

/// A lazily-executed query against one [`Store`].
///
/// [`Query::matching`] carries the rule the planner may absorb into index
/// keys; [`Query::filter`] stays residual and never influences index
/// choice. With neither set, the query walks the whole model.
#[derive(Debug)]
pub struct Query<'a, M: Model> {
    store: &'a Store<M>,
    rule: Option<Rule>,
    filter: Option<Rule>,
    limit: Option<usize>,
    start_after: Option<PageToken>,
    order: Order,
}

/// Everything execution needs, assembled once per call.
struct Prepared {
    plan: QueryPlan,
    query: CompiledQuery,
    window: Window,
}

impl<'a, M: Model> Query<'a, M> {
    pub(crate) fn new(store: &'a Store<M>) -> Self {
        Self {
            store,
            rule: None,
            filter: None,
            limit: None,
            start_after: None,
            order: Order::Ascending,
        }
    }

    /// Sets the rule the planner splits into key conditions and residual.
    #[must_use]
    pub fn matching(mut self, rule: Rule) -> Self {
        self.rule = Some(rule);
        self
    }

    /// Adds a filter that stays residual regardless of the chosen plan.
    ///
    /// Repeated calls AND the filters together.
    #[must_use]
    pub fn filter(mut self, rule: Rule) -> Self {
        self.filter = Some(match self.filter.take() {
            None => rule,
            Some(existing) => existing.and(rule),
        });
        self
    }

    /// Caps the page size; zero means unbounded.
    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = if limit == 0 { None } else { Some(limit) };
        self
    }

    /// Resumes strictly after the record a previous page's token names.
    #[must_use]
    pub fn start_after(mut self, token: PageToken) -> Self {
        self.start_after = Some(token);
        self
    }

    /// Sets the traversal order. Descending requires a key-backed plan.
    #[must_use]
    pub fn order(mut self, order: Order) -> Self {
        self.order = order;
        self
    }

    /// Shorthand for [`Query::order`] with [`Order::Descending`].
    #[must_use]
    pub fn descending(mut self) -> Self {
        self.order = Order::Descending;
        self
    }

    /// Executes the query and returns one page.
    pub fn fetch(self) -> Result<Page<M>> {
        let (prepared, store) = self.prepare()?;
        let raw = store
            .backend()
            .execute(store.capability(), &prepared.query, &prepared.window)?;
        let next_token = match &raw.last_key {
            None => None,
            Some(last) => Some(cursor::encode(store.capability(), &prepared.plan, last)?),
        };
        let mut items = Vec::with_capacity(raw.items.len());
        for record in &raw.items {
            items.push(M::from_record(record)?);
        }
        Ok(Page { items, next_token })
    }

    /// Executes the query and returns only the first record, if any.
    ///
    /// No continuation token is issued, so this works even when the
    /// first record has no resume position a token could name.
    pub fn first(self) -> Result<Option<M>> {
        let (prepared, store) = self.limit(1).prepare()?;
        let raw = store
            .backend()
            .execute(store.capability(), &prepared.query, &prepared.window)?;
        raw.items
            .first()
            .map(M::from_record)
            .transpose()
            .map_err(Error::from)
    }

    /// Executes the query and returns how many records the window holds.
    ///
    /// A limit caps the answer the same way it caps a page, and a
    /// resume token counts only the records after it.
    pub fn count(self) -> Result<u64> {
        let (prepared, store) = self.prepare()?;
        Ok(store
            .backend()
            .count(store.capability(), &prepared.query, &prepared.window)?)
    }

    /// Collects every matching record, following continuation tokens.
    ///
    /// The configured limit bounds each page, not the whole result.
    pub fn all(self) -> Result<Vec<M>> {
        let store = self.store;
        let rule = self.rule;
        let filter = self.filter;
        let limit = self.limit;
        let order = self.order;
        let mut next = self.start_after;
        let mut items = Vec::new();
        loop {
            let page = Query {
                store,
                rule: rule.clone(),
                filter: filter.clone(),
                limit,
                start_after: next,
                order,
            }
            .fetch()?;
            items.extend(page.items);
            match page.next_token {
                Some(token) => next = Some(token),
                None => return Ok(items),
            }
        }
    }

    /// Plans, compiles, and frames the query without touching the backend.
    fn prepare(self) -> Result<(Prepared, &'a Store<M>)> {
        let store = self.store;
        let capability = store.capability();
        let mut query_plan = plan(self.rule.as_ref(), capability)?;
        query_plan.check_order(self.order)?;
        if let Some(filter) = self.filter {
            query_plan.residual_filter = Some(match query_plan.residual_filter.take() {
                None => filter,
                Some(residual) => residual.and(filter),
            });
        }
        let compiled = compile(&query_plan, capability, store.backend().flavor())?;
        let start_after = match &self.start_after {
            None => None,
            Some(token) => Some(cursor::resume(capability, &query_plan, token)?),
        };
        let window = Window {
            order: self.order,
            limit: self.limit,
            start_after,
        };
        Ok((
            Prepared {
                plan: query_plan,
                query: compiled,
                window,
            },
            store,
        ))
    }
}
