//! MANUAL_CONTROL output: four axes plus a button bitfield

use crate::link::TargetIds;
use crate::mapping::scaling::ScaledControl;
use crate::mapping::strategy::{OutputMode, OutputStrategy};
use mavlink::common::{MavMessage, MANUAL_CONTROL_DATA};

#[derive(Debug, Clone, Copy, Default)]
pub struct ManualControlStrategy;

impl OutputStrategy for ManualControlStrategy {
    fn encode(&self, control: &ScaledControl, target: TargetIds) -> MavMessage {
        MavMessage::MANUAL_CONTROL(MANUAL_CONTROL_DATA {
            target: target.system,
            x: control.x,
            y: control.y,
            z: control.z,
            r: control.r,
            buttons: control.buttons,
            ..Default::default()
        })
    }

    fn mode(&self) -> OutputMode {
        OutputMode::ManualControl
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn encodes_all_axes_and_buttons_for_the_target() {
        let control = ScaledControl {
            x: 0,
            y: -250,
            z: 1000,
            r: 730,
            buttons: 0b1010,
        };
        let target = TargetIds {
            system: 3,
            component: 1,
        };

        match ManualControlStrategy.encode(&control, target) {
            MavMessage::MANUAL_CONTROL(data) => {
                assert_eq!(data.target, 3);
                assert_eq!((data.x, data.y, data.z, data.r), (0, -250, 1000, 730));
                assert_eq!(data.buttons, 0b1010);
            }
            other => panic!("unexpected message {:?}", other),
        }
    }
}
