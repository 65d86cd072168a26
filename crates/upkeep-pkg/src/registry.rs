//! Manager kind to routine lookup

use crate::apt::AptRoutine;
use crate::asdf::AsdfRoutine;
use crate::brew::BrewRoutine;
use crate::npm::NpmRoutine;
use crate::pacman::PacmanRoutine;
use crate::pip::PipRoutine;
use crate::sdkman::SdkmanRoutine;
use crate::traits::UpdateRoutine;
use crate::types::ManagerKind;
use crate::yay::YayRoutine;

static BREW: BrewRoutine = BrewRoutine;
static ASDF: AsdfRoutine = AsdfRoutine;
static SDKMAN: SdkmanRoutine = SdkmanRoutine;
static APT: AptRoutine = AptRoutine;
static PACMAN: PacmanRoutine = PacmanRoutine;
static YAY: YayRoutine = YayRoutine;
static PIP: PipRoutine = PipRoutine;
static NPM: NpmRoutine = NpmRoutine;

/// The dedicated routine for a manager
#[must_use]
pub fn routine(kind: ManagerKind) -> &'static dyn UpdateRoutine {
    match kind {
        ManagerKind::Brew => &BREW,
        ManagerKind::Asdf => &ASDF,
        ManagerKind::Sdkman => &SDKMAN,
        ManagerKind::Apt => &APT,
        ManagerKind::Pacman => &PACMAN,
        ManagerKind::Yay => &YAY,
        ManagerKind::Pip => &PIP,
        ManagerKind::Npm => &NPM,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_kind_has_its_routine() {
        for kind in ManagerKind::ALL {
            assert_eq!(routine(kind).kind(), kind);
        }
    }
}
