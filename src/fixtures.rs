//! Record builders for tests and local replay tooling
//!
//! Everything here produces records exactly as the export service would
//! deliver them, so collector scenarios read like ledger traces.

#![doc(hidden)]

use crate::record::{
    prototype, ActivateBody, AmendBody, CallType, PulseNumber, Record, RecordId,
    RequestBody, ResultBody, Virtual,
};
use serde_json::{json, Value};

/// Default pulse of fixture records
pub const PULSE: PulseNumber = PulseNumber(70_000);

/// Reason carried by API calls: they have no parent request
pub const NO_REASON: RecordId = RecordId::new(PulseNumber(0), 0);

pub fn id(local: u32) -> RecordId {
    RecordId::new(PULSE, local)
}

pub fn id_at(pulse: u32, local: u32) -> RecordId {
    RecordId::new(PulseNumber(pulse), local)
}

fn bytes(value: &Value) -> Vec<u8> {
    serde_json::to_vec(value).unwrap_or_default()
}

fn request_body(reason: RecordId, prototype: Option<RecordId>, method: &str) -> RequestBody {
    RequestBody {
        object: None,
        prototype,
        caller: None,
        method: method.to_string(),
        arguments: Vec::new(),
        reason,
        api_request_id: None,
        call_type: CallType::Method,
    }
}

/// Incoming `Call` from the public API
pub fn api_call(id: RecordId, call_site: &str, call_params: Value, reference: Option<&str>) -> Record {
    let mut body = request_body(NO_REASON, None, crate::record::payload::API_CALL_METHOD);
    body.arguments = bytes(&json!({
        "callSite": call_site,
        "callParams": call_params,
        "reference": reference,
        "publicKey": format!("pk-{}", id),
    }));
    body.api_request_id = Some(format!("api-{}", id));
    Record::new(id, None, Virtual::IncomingRequest(body))
}

/// Incoming request executed on behalf of `reason`
pub fn incoming(id: RecordId, reason: RecordId, object: Option<RecordId>, prototype: Option<RecordId>, method: &str) -> Record {
    let mut body = request_body(reason, prototype, method);
    body.object = object;
    Record::new(id, object, Virtual::IncomingRequest(body))
}

/// Outgoing method call issued while executing `reason`
pub fn outgoing(id: RecordId, reason: RecordId, prototype: Option<RecordId>, method: &str) -> Record {
    Record::new(id, None, Virtual::OutgoingRequest(request_body(reason, prototype, method)))
}

/// Outgoing constructor call creating an object of `prototype`
pub fn constructor(id: RecordId, reason: RecordId, prototype: RecordId) -> Record {
    let mut body = request_body(reason, Some(prototype), "New");
    body.call_type = CallType::Constructor;
    Record::new(id, None, Virtual::OutgoingRequest(body))
}

pub fn result(id: RecordId, request: RecordId, returns: Value) -> Record {
    Record::new(
        id,
        None,
        Virtual::Result(ResultBody {
            object: None,
            request,
            payload: bytes(&json!({ "returns": returns })),
        }),
    )
}

pub fn failed_result(id: RecordId, request: RecordId, error: &str) -> Record {
    Record::new(
        id,
        None,
        Virtual::Result(ResultBody {
            object: None,
            request,
            payload: bytes(&json!({ "returns": null, "error": error })),
        }),
    )
}

pub fn activate(id: RecordId, object: RecordId, request: RecordId, image: RecordId, memory: Value) -> Record {
    Record::new(
        id,
        Some(object),
        Virtual::Activate(ActivateBody {
            request,
            image,
            memory: bytes(&memory),
            parent: None,
        }),
    )
}

pub fn amend(id: RecordId, object: RecordId, request: RecordId, image: RecordId, prev_state: RecordId, memory: Value) -> Record {
    Record::new(
        id,
        Some(object),
        Virtual::Amend(AmendBody {
            request,
            image,
            memory: bytes(&memory),
            prev_state,
        }),
    )
}

/// Bootstrap pulse: one member with wallet, account and a deposit, one
/// migration shard, and a public-key shard entry pointing at a missing member
pub fn genesis_trace() -> Vec<Record> {
    let g = PulseNumber::GENESIS.0;
    let boot = id_at(g, 1);
    vec![
        activate(
            id_at(g, 10),
            id_at(g, 10),
            boot,
            prototype::MEMBER,
            json!({"publicKey": "pk-root", "wallet": id_at(g, 11).to_string()}),
        ),
        activate(
            id_at(g, 11),
            id_at(g, 11),
            boot,
            prototype::WALLET,
            json!({
                "accounts": {"XNS": id_at(g, 12).to_string()},
                "deposits": {"0xeth": id_at(g, 13).to_string()}
            }),
        ),
        activate(id_at(g, 12), id_at(g, 12), boot, prototype::ACCOUNT, json!({"balance": "1000"})),
        activate(
            id_at(g, 13),
            id_at(g, 13),
            boot,
            prototype::DEPOSIT,
            json!({"balance": "50", "amount": "50", "txHash": "0xeth", "isConfirmed": true}),
        ),
        activate(
            id_at(g, 20),
            id_at(g, 20),
            boot,
            prototype::PUBLIC_KEY_SHARD,
            json!({"map": {"pk-root": id_at(g, 10).to_string(), "pk-ghost": id_at(g, 99).to_string()}}),
        ),
        activate(
            id_at(g, 30),
            id_at(g, 30),
            boot,
            prototype::MIGRATION_SHARD,
            json!({"freeAddresses": ["0xa", "0xb"]}),
        ),
        // Account and deposit amended later in the same pulse
        amend(id_at(g, 40), id_at(g, 12), boot, prototype::ACCOUNT, id_at(g, 12), json!({"balance": "900"})),
        amend(
            id_at(g, 41),
            id_at(g, 13),
            boot,
            prototype::DEPOSIT,
            id_at(g, 13),
            json!({"balance": "25", "amount": "50", "txHash": "0xeth", "isConfirmed": true}),
        ),
    ]
}
