use crate::domain_port::*;
use crate::infra_supabase::SupabaseBackend;
use crate::infra_supabase::wire::*;
use reqwest::header::{AUTHORIZATION, HeaderValue};
use url::Url;

impl SupabaseBackend {
    pub(crate) fn table_url(&self, table: Table, filters: &[Filter<'_>]) -> Result<Url, BackendError> {
        let mut url = self.endpoint(&format!("rest/v1/{}", table.name()))?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("select", "*");
            for (column, value) in filters {
                query.append_pair(column, &format!("eq.{value}"));
            }
        }
        Ok(url)
    }
}

#[async_trait::async_trait]
impl TableStore for SupabaseBackend {
    async fn query_one(
        &self,
        table: Table,
        filters: &[Filter<'_>],
    ) -> Result<Option<Row>, BackendError> {
        let mut url = self.table_url(table, filters)?;
        // Two rows are enough to tell "one" from "ambiguous".
        url.query_pairs_mut().append_pair("limit", "2");
        let response = self
            .http
            .get(url)
            .header(AUTHORIZATION, self.bearer())
            .send()
            .await
            .map_err(transport)?;
        let mut rows: Vec<Row> = read_json(response).await?;
        match rows.len() {
            0 => Ok(None),
            1 => Ok(rows.pop()),
            n => Err(BackendError::Rejected {
                status: 406,
                message: format!("{n}+ rows in {table} match, expected one"),
            }),
        }
    }

    async fn insert(&self, table: Table, row: Row) -> Result<(), BackendError> {
        let url = self.endpoint(&format!("rest/v1/{}", table.name()))?;
        let response = self
            .http
            .post(url)
            .header(AUTHORIZATION, self.bearer())
            .header("Prefer", HeaderValue::from_static("return=minimal"))
            .json(&row)
            .send()
            .await
            .map_err(transport)?;
        expect_success(response).await?;
        tracing::debug!(%table, "row inserted");
        Ok(())
    }
}
