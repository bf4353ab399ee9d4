//! OpenAPI document for the REST surface.

use utoipa::OpenApi;

use super::handlers::{deal, internal, system, wallet};

/// Generated OpenAPI description, served at `/api-docs/openapi.json`.
#[derive(Debug, OpenApi)]
#[openapi(
    info(
        title = "tg-escrow-gateway",
        description = "Deal lifecycle and escrow ledger for Telegram sponsored posts"
    ),
    paths(
        deal::create_deal,
        deal::list_deals,
        deal::get_deal,
        deal::approve_deal,
        deal::apply_action,
        deal::post_result,
        deal::get_escrow,
        internal::apply_system_action,
        wallet::get_wallet,
        wallet::deposit,
        wallet::list_transactions,
        system::health_handler,
        system::transitions_handler,
    ),
    tags(
        (name = "Deals", description = "Deal lifecycle"),
        (name = "Wallets", description = "Balances and ledger"),
        (name = "System", description = "Health and metadata"),
        (name = "Internal", description = "System-role operations, mounted only on private listeners"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_every_route() {
        let doc = ApiDoc::openapi();
        for path in [
            "/api/v1/deals",
            "/api/v1/deals/{id}/actions",
            "/api/v1/wallets/{user_id}/deposit",
            "/config/transitions",
            "/internal/v1/deals/{id}/system-actions",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
