//! # Stock Ledger Rules
//!
//! Pure rules for movements: what a movement does to stock, which status
//! transitions are allowed, and what a well-formed movement or transfer is.
//! The persistence layer applies these inside a transaction.
//!
//! ## Movement Effects
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  stock = 10                                                             │
//! │                                                                         │
//! │  complete IN(10)           → 20                                         │
//! │  complete OUT(15)          → ✗ InsufficientStock, stock stays 20 → ok  │
//! │  complete OUT(25)          → ✗ InsufficientStock (available 20)        │
//! │  complete ADJUSTMENT(2.5)  → 22.5                                       │
//! │                                                                         │
//! │  PENDING movements have no effect. CANCELLED never had one.            │
//! │  A COMPLETED effect is undone only by a compensating movement.         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::quantity::Quantity;
use crate::types::{Movement, MovementStatus, MovementType, NewMovement, NewTransfer, StockEffect};
use crate::validation::validate_positive_quantity;

const MOVEMENT: &str = "Movement";

/// Stock level after applying a completed movement of `movement_type`.
///
/// ## Arguments
/// * `product_id`, `branch_id` - Only used to give the error context
pub fn apply_effect(
    product_id: &str,
    branch_id: &str,
    stock: Quantity,
    movement_type: MovementType,
    quantity: Quantity,
) -> CoreResult<Quantity> {
    match movement_type.effect() {
        StockEffect::Increase => Ok(stock + quantity),
        StockEffect::Decrease => {
            stock
                .checked_sub(quantity)
                .ok_or_else(|| CoreError::InsufficientStock {
                    product_id: product_id.to_string(),
                    branch_id: branch_id.to_string(),
                    available: stock,
                    requested: quantity,
                })
        }
    }
}

/// Signed stock delta of a movement (negative for outbound types).
pub fn stock_delta(movement_type: MovementType, quantity: Quantity) -> i64 {
    match movement_type.effect() {
        StockEffect::Increase => quantity.milli(),
        StockEffect::Decrease => -quantity.milli(),
    }
}

/// Checks that a movement may transition to COMPLETED.
pub fn ensure_completable(movement: &Movement) -> CoreResult<()> {
    match movement.status {
        MovementStatus::Pending => Ok(()),
        MovementStatus::Completed => Err(CoreError::already(
            MOVEMENT,
            &movement.id,
            MovementStatus::Completed,
        )),
        MovementStatus::Cancelled => Err(CoreError::transition(
            MOVEMENT,
            &movement.id,
            MovementStatus::Cancelled,
            "complete",
        )),
    }
}

/// Checks that a movement may transition to CANCELLED.
///
/// Only pending movements can be cancelled. A completed movement already
/// changed stock; undoing it takes an explicit compensating movement.
pub fn ensure_cancellable(movement: &Movement) -> CoreResult<()> {
    match movement.status {
        MovementStatus::Pending => Ok(()),
        MovementStatus::Cancelled => Err(CoreError::already(
            MOVEMENT,
            &movement.id,
            MovementStatus::Cancelled,
        )),
        MovementStatus::Completed => Err(CoreError::transition(
            MOVEMENT,
            &movement.id,
            MovementStatus::Completed,
            "cancel (record a compensating movement instead)",
        )),
    }
}

/// Transfer halves change status only together, through their transfer.
pub fn ensure_standalone(movement: &Movement, action: &'static str) -> CoreResult<()> {
    if movement.movement_type.is_transfer() {
        return Err(CoreError::transition(
            MOVEMENT,
            &movement.id,
            movement.movement_type,
            action,
        ));
    }
    Ok(())
}

/// Rejects recording a lone transfer half; transfers create both.
pub fn validate_standalone_type(movement_type: MovementType) -> CoreResult<()> {
    if movement_type.is_transfer() {
        return Err(ValidationError::Inconsistent {
            field: "movement_type".to_string(),
            reason: format!("{movement_type} movements are created by a transfer"),
        }
        .into());
    }
    Ok(())
}

/// Shape checks on a movement before anything is looked up.
///
/// ## Rules
/// - quantity > 0
/// - transfer types carry both branches, and they differ
/// - non-transfer types carry neither
pub fn validate_new_movement(input: &NewMovement) -> CoreResult<()> {
    validate_positive_quantity(input.quantity)?;

    if input.movement_type.is_transfer() {
        let (source, target) = match (&input.source_branch_id, &input.target_branch_id) {
            (Some(source), Some(target)) => (source, target),
            _ => {
                return Err(ValidationError::Required {
                    field: "source_branch_id and target_branch_id".to_string(),
                }
                .into())
            }
        };
        validate_distinct_branches(source, target)?;
    } else if input.source_branch_id.is_some() || input.target_branch_id.is_some() {
        return Err(ValidationError::Inconsistent {
            field: "source_branch_id".to_string(),
            reason: format!("only transfer movements have branches, got {}", input.movement_type),
        }
        .into());
    }

    Ok(())
}

/// Shape checks on a transfer request.
pub fn validate_transfer(input: &NewTransfer) -> CoreResult<()> {
    validate_positive_quantity(input.quantity)?;
    validate_distinct_branches(&input.from_branch_id, &input.to_branch_id)
}

fn validate_distinct_branches(source: &str, target: &str) -> CoreResult<()> {
    if source == target {
        return Err(ValidationError::Inconsistent {
            field: "target_branch_id".to_string(),
            reason: "source and target branch must differ".to_string(),
        }
        .into());
    }
    Ok(())
}

/// Identifies the OUT and IN halves among the movements sharing a reference.
///
/// Anything but exactly one TRANSFER_OUT plus one TRANSFER_IN means there is
/// no transfer under that reference.
pub fn pair_transfer(
    reference_id: &str,
    movements: Vec<Movement>,
) -> CoreResult<(Movement, Movement)> {
    let not_found = || CoreError::not_found("Transfer", reference_id);

    if movements.len() != 2 {
        return Err(not_found());
    }

    let mut outbound = None;
    let mut inbound = None;
    for movement in movements {
        match movement.movement_type {
            MovementType::TransferOut if outbound.is_none() => outbound = Some(movement),
            MovementType::TransferIn if inbound.is_none() => inbound = Some(movement),
            _ => return Err(not_found()),
        }
    }

    match (outbound, inbound) {
        (Some(out), Some(inb)) => Ok((out, inb)),
        _ => Err(not_found()),
    }
}
