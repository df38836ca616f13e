use crate::types::NUM_SVNS;
use core::fmt;
use core::num::NonZeroU8;

/// Galileo SVN.
///
/// The SVN is the Galileo satellite number, which is a number between 1 and
/// 36. This struct stores the SVN internally as a `NonZeroU8`, and guarantees
/// at construction that the value is always in range.
///
/// # Examples
///
/// ```
/// use osnma_receiver::Svn;
///
/// let svn = Svn::try_from(24).unwrap();
/// assert_eq!(format!("{}", svn), "E24");
/// assert_eq!(svn.index(), 23);
/// ```
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct Svn(NonZeroU8);

impl Svn {
    /// Iterate over all the SVNs, from E01 to E36.
    pub fn iter() -> impl Iterator<Item = Svn> {
        (1..=NUM_SVNS as u8).map(|x| Svn(NonZeroU8::new(x).unwrap()))
    }

    /// Zero-based index of the SVN, suitable for per-satellite arrays.
    pub fn index(&self) -> usize {
        usize::from(self.0.get()) - 1
    }
}

macro_rules! impl_conv {
    ($t: ty) => {
        impl From<Svn> for $t {
            fn from(svn: Svn) -> $t {
                // NUM_SVNS fits in every integer type listed below
                svn.0.get() as $t
            }
        }

        impl TryFrom<$t> for Svn {
            type Error = SvnError;
            fn try_from(value: $t) -> Result<Svn, SvnError> {
                if value >= 1 && value <= NUM_SVNS as $t {
                    NonZeroU8::new(value as u8)
                        .map(Svn)
                        .ok_or(SvnError::OutOfRange)
                } else {
                    Err(SvnError::OutOfRange)
                }
            }
        }
    };
}

impl_conv!(u8);
impl_conv!(u16);
impl_conv!(u32);
impl_conv!(u64);
impl_conv!(usize);
impl_conv!(i32);
impl_conv!(i64);

/// Formats an SVN as Exx.
impl fmt::Display for Svn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E{:02}", self.0)
    }
}

/// SVN construction error.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, thiserror::Error)]
pub enum SvnError {
    /// The value is outside the range 1-36.
    #[error("SVN out of range 1-36")]
    OutOfRange,
}

/// PRN_D value reserved for dummy tags.
pub const DUMMY_PRN: u8 = 255;

/// Classification of the PRN_D field of a tag.
///
/// The PRN_D field of a tag can designate a Galileo satellite, a satellite of
/// another GNSS, or be the dummy sentinel.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum Prn {
    /// Galileo satellite (PRN 1 to 36).
    Galileo(Svn),
    /// Satellite of another GNSS (PRN 64 to 95).
    OtherGnss(u8),
    /// Dummy tag (PRN 255).
    Dummy,
    /// Any other value.
    Reserved(u8),
}

impl From<u8> for Prn {
    fn from(value: u8) -> Prn {
        match value {
            DUMMY_PRN => Prn::Dummy,
            64..=95 => Prn::OtherGnss(value),
            _ => match Svn::try_from(value) {
                Ok(svn) => Prn::Galileo(svn),
                Err(_) => Prn::Reserved(value),
            },
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn from_int() {
        let error = Err(SvnError::OutOfRange);
        for j in 1..=NUM_SVNS {
            assert!(Svn::try_from(j).is_ok());
        }
        assert_eq!(Svn::try_from(0u8), error);
        assert_eq!(Svn::try_from(37u8), error);
        assert_eq!(Svn::try_from(-1i32), error);
    }

    #[test]
    fn iterator() {
        let mut n = 0;
        for svn in Svn::iter() {
            n += 1;
            assert_eq!(usize::from(svn), n);
            assert_eq!(svn.index(), n - 1);
        }
        assert_eq!(n, 36);
    }

    #[test]
    fn prn_classes() {
        assert_eq!(Prn::from(3), Prn::Galileo(Svn::try_from(3u8).unwrap()));
        assert_eq!(Prn::from(64), Prn::OtherGnss(64));
        assert_eq!(Prn::from(95), Prn::OtherGnss(95));
        assert_eq!(Prn::from(255), Prn::Dummy);
        assert_eq!(Prn::from(0), Prn::Reserved(0));
        assert_eq!(Prn::from(40), Prn::Reserved(40));
    }
}
