//! Order issuer: one host call per intent, with a last-command record.
//!
//! Every method records the command against the acting unit (last write
//! wins), forwards exactly one call to the [`CommandGateway`] and turns a
//! host refusal into [`AiError::Gateway`]. Nothing is retried here; the
//! scheduler's next idle cycle is the retry.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::command::Command;
use crate::error::{AiError, Result};
use crate::host::CommandGateway;
use crate::math::{Fixed, Vec3Fixed};
use crate::units::UnitId;

/// The last command given to a unit. Diagnostic only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandRecord {
    /// Frame the command was issued on.
    pub issued_at: u32,
    /// Human-readable description.
    pub description: String,
}

/// Serializes decisions into host commands.
#[derive(Debug, Clone, Default)]
pub struct OrderIssuer {
    records: BTreeMap<UnitId, CommandRecord>,
}

impl OrderIssuer {
    /// Create an issuer with no history.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build `unit_type` at `position` (mobile builders).
    pub fn build_unit_at<G: CommandGateway + ?Sized>(
        &mut self,
        gateway: &mut G,
        unit: UnitId,
        unit_type: &str,
        position: Vec3Fixed,
    ) -> Result<()> {
        self.issue(gateway, unit, Command::build_at(unit_type, position))
    }

    /// Build `unit_type` in place (factories).
    pub fn build_unit<G: CommandGateway + ?Sized>(
        &mut self,
        gateway: &mut G,
        unit: UnitId,
        unit_type: &str,
    ) -> Result<()> {
        self.issue(gateway, unit, Command::build_in_place(unit_type))
    }

    /// Move to a position.
    pub fn move_to<G: CommandGateway + ?Sized>(
        &mut self,
        gateway: &mut G,
        unit: UnitId,
        position: Vec3Fixed,
    ) -> Result<()> {
        self.issue(gateway, unit, Command::MoveTo(position))
    }

    /// Guard (assist) another unit.
    pub fn guard<G: CommandGateway + ?Sized>(
        &mut self,
        gateway: &mut G,
        unit: UnitId,
        target: UnitId,
    ) -> Result<()> {
        self.issue(gateway, unit, Command::Guard(target))
    }

    /// Attack another unit.
    pub fn attack<G: CommandGateway + ?Sized>(
        &mut self,
        gateway: &mut G,
        unit: UnitId,
        target: UnitId,
    ) -> Result<()> {
        self.issue(gateway, unit, Command::Attack(target))
    }

    /// Reclaim everything within `radius` of `position`.
    pub fn reclaim<G: CommandGateway + ?Sized>(
        &mut self,
        gateway: &mut G,
        unit: UnitId,
        position: Vec3Fixed,
        radius: Fixed,
    ) -> Result<()> {
        self.issue(gateway, unit, Command::Reclaim { position, radius })
    }

    /// Stop all actions.
    pub fn stop<G: CommandGateway + ?Sized>(
        &mut self,
        gateway: &mut G,
        unit: UnitId,
    ) -> Result<()> {
        self.issue(gateway, unit, Command::Stop)
    }

    /// Self-destruct.
    pub fn self_destruct<G: CommandGateway + ?Sized>(
        &mut self,
        gateway: &mut G,
        unit: UnitId,
    ) -> Result<()> {
        self.issue(gateway, unit, Command::SelfDestruct)
    }

    fn issue<G: CommandGateway + ?Sized>(
        &mut self,
        gateway: &mut G,
        unit: UnitId,
        command: Command,
    ) -> Result<()> {
        let issued_at = gateway.current_frame();
        let description = command.to_string();
        tracing::debug!(frame = issued_at, %unit, "order: {description}");
        self.records.insert(
            unit,
            CommandRecord {
                issued_at,
                description,
            },
        );

        gateway.give_order(unit, &command).map_err(|source| {
            tracing::warn!(%unit, %command, "host rejected order: {source}");
            AiError::Gateway {
                unit,
                command,
                source,
            }
        })
    }

    /// Last command given to a unit.
    #[must_use]
    pub fn last_command(&self, unit: UnitId) -> Option<&CommandRecord> {
        self.records.get(&unit)
    }

    /// All last-command records, ascending by unit.
    pub fn records(&self) -> impl Iterator<Item = (&UnitId, &CommandRecord)> {
        self.records.iter()
    }

    /// Drop the record of a unit that no longer exists.
    pub fn forget(&mut self, unit: UnitId) {
        self.records.remove(&unit);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GatewayError;
    use crate::units::UnitDef;

    #[derive(Default)]
    struct RecordingGateway {
        frame: u32,
        reject: bool,
        sent: Vec<(UnitId, Command)>,
    }

    impl CommandGateway for RecordingGateway {
        fn give_order(
            &mut self,
            unit: UnitId,
            command: &Command,
        ) -> std::result::Result<(), GatewayError> {
            self.sent.push((unit, command.clone()));
            if self.reject {
                Err(GatewayError::Rejected("blocked".into()))
            } else {
                Ok(())
            }
        }

        fn unit_position(&self, _unit: UnitId) -> Option<Vec3Fixed> {
            None
        }

        fn unit_is_busy(&self, _unit: UnitId) -> bool {
            false
        }

        fn current_frame(&self) -> u32 {
            self.frame
        }

        fn unit_def(&self, _type_name: &str) -> Option<UnitDef> {
            None
        }

        fn friendly_units(&self) -> Vec<(UnitId, String)> {
            Vec::new()
        }
    }

    #[test]
    fn test_each_intent_is_one_gateway_call() {
        let mut gateway = RecordingGateway::default();
        let mut issuer = OrderIssuer::new();
        let unit = UnitId(1);

        issuer.build_unit_at(&mut gateway, unit, "armsolar", Vec3Fixed::ZERO).unwrap();
        issuer.build_unit(&mut gateway, unit, "armcv").unwrap();
        issuer.move_to(&mut gateway, unit, Vec3Fixed::ZERO).unwrap();
        issuer.guard(&mut gateway, unit, UnitId(2)).unwrap();
        issuer.attack(&mut gateway, unit, UnitId(3)).unwrap();
        issuer
            .reclaim(&mut gateway, unit, Vec3Fixed::ZERO, Fixed::from_num(100))
            .unwrap();
        issuer.stop(&mut gateway, unit).unwrap();
        issuer.self_destruct(&mut gateway, unit).unwrap();

        assert_eq!(gateway.sent.len(), 8);
        assert_eq!(gateway.sent[3], (unit, Command::Guard(UnitId(2))));
    }

    #[test]
    fn test_last_write_wins() {
        let mut gateway = RecordingGateway {
            frame: 40,
            ..Default::default()
        };
        let mut issuer = OrderIssuer::new();
        issuer.stop(&mut gateway, UnitId(1)).unwrap();
        gateway.frame = 41;
        issuer.guard(&mut gateway, UnitId(1), UnitId(5)).unwrap();

        let record = issuer.last_command(UnitId(1)).unwrap();
        assert_eq!(record.issued_at, 41);
        assert_eq!(record.description, "guard 5");
        assert_eq!(issuer.records().count(), 1);
    }

    #[test]
    fn test_rejection_is_surfaced_and_still_recorded() {
        let mut gateway = RecordingGateway {
            reject: true,
            ..Default::default()
        };
        let mut issuer = OrderIssuer::new();
        let err = issuer.stop(&mut gateway, UnitId(9)).unwrap_err();

        assert!(err.is_gateway_rejection());
        assert_eq!(gateway.sent.len(), 1);
        assert!(issuer.last_command(UnitId(9)).is_some());
    }
}
