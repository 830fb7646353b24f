//! Transfers, deposit releases and migrations as transactions
//!
//! A transaction is registered when its API call appears and finished when
//! the call's result appears, possibly several pulses later.

use super::{ApiResult, Collector};
use crate::collecting::CollectError;
use crate::model::{TxKind, TxRegister, TxResult, TxStatus};
use crate::record::{Record, Request};
use async_trait::async_trait;

fn register_from(request: &Request) -> Option<TxRegister> {
    let params = request.call_params()?;
    let kind = TxKind::from_call_site(&params.call_site)?;
    let reference = params.reference.clone();

    let (member_from, member_to, deposit) = match kind {
        TxKind::Transfer => (
            reference,
            Some(params.param_str("toMemberReference")),
            None,
        ),
        TxKind::Release => (None, reference, Some(params.param_str("ethTxHash"))),
        TxKind::Migration => (
            None,
            Some(params.param_str("memberReference")),
            Some(params.param_str("ethTxHash")),
        ),
    };

    Some(TxRegister {
        tx_id: request.id.to_string(),
        kind,
        member_from,
        member_to,
        deposit,
        amount: params.param_str("amount"),
        pulse: request.id.pulse(),
    })
}

#[derive(Default)]
pub struct TxRegisterCollector;

#[async_trait]
impl Collector for TxRegisterCollector {
    type Output = TxRegister;

    async fn collect(&mut self, record: &Record) -> Result<Vec<TxRegister>, CollectError> {
        if !record.is_incoming_request() {
            return Ok(Vec::new());
        }
        let register = Request::from_record(record)
            .filter(Request::is_api_call)
            .as_ref()
            .and_then(register_from);
        Ok(register.into_iter().collect())
    }
}

#[derive(Default)]
pub struct TxResultCollector;

#[async_trait]
impl Collector for TxResultCollector {
    type Output = TxResult;

    async fn collect_call(&mut self, call: &ApiResult) -> Result<Vec<TxResult>, CollectError> {
        if TxKind::from_call_site(call.call_site()).is_none() {
            return Ok(Vec::new());
        }

        let result = &call.result;
        let status = if result.is_success() {
            TxStatus::Succeeded
        } else {
            TxStatus::Failed
        };
        Ok(vec![TxResult {
            tx_id: call.request.id.to_string(),
            status,
            fee: result.payload().and_then(|p| p.return_str("fee")),
            pulse: result.id.pulse(),
        }])
    }
}
