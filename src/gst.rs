use core::fmt;

/// Galileo week number.
///
/// The broadcast week number has 12 bits, so it wraps around every 4096 weeks.
pub type Wn = u16;
/// Time of week.
///
/// This represents the time of week in seconds.
pub type Tow = u32;

const SECS_IN_WEEK: Tow = 24 * 3600 * 7;
const SECS_PER_SUBFRAME: Tow = 30;
const WN_MODULUS: i64 = 4096;

/// GST (Galileo System Time)
///
/// The Galileo System Time, stored as a week number (modulo 4096) and a time
/// of week. GSTs are totally ordered, but comparisons across a week number
/// rollover should use [`Gst::seconds_since`], which is wraparound-correct.
///
/// # Examples
/// ```
/// use osnma_receiver::Gst;
///
/// let gst = Gst::new(1177, 175767);
/// assert_eq!(gst.wn(), 1177);
/// assert_eq!(gst.tow(), 175767);
/// ```
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct Gst {
    wn: Wn,
    tow: Tow,
}

impl Gst {
    /// Constructs a new GST from a week number and TOW.
    ///
    /// The week number is reduced modulo 4096.
    ///
    /// # Panics
    ///
    /// Panics if `tow` is greater or equal to 604800 (the number of
    /// seconds in a week).
    pub fn new(wn: Wn, tow: Tow) -> Self {
        assert!(tow < SECS_IN_WEEK);
        Gst {
            wn: wn % 4096,
            tow,
        }
    }

    /// Constructs a GST, returning `None` if `tow` is out of range.
    pub fn try_new(wn: Wn, tow: Tow) -> Option<Self> {
        (tow < SECS_IN_WEEK).then(|| Gst::new(wn, tow))
    }

    /// Returns the week number of the GST.
    pub fn wn(&self) -> Wn {
        self.wn
    }

    /// Returns the time of week of the GST.
    pub fn tow(&self) -> Tow {
        self.tow
    }

    fn total_seconds(&self) -> i64 {
        i64::from(self.wn) * i64::from(SECS_IN_WEEK) + i64::from(self.tow)
    }

    fn from_total_seconds(total: i64) -> Self {
        let period = WN_MODULUS * i64::from(SECS_IN_WEEK);
        let total = total.rem_euclid(period);
        let secs_in_week = i64::from(SECS_IN_WEEK);
        // Both values are in range by construction of rem_euclid.
        Gst {
            wn: (total / secs_in_week) as Wn,
            tow: (total % secs_in_week) as Tow,
        }
    }

    /// Adds `seconds` seconds to the GST.
    ///
    /// The GST corresponding to the sum is returned. The week number wraps
    /// around modulo 4096.
    ///
    /// # Examples
    ///
    /// ```
    /// use osnma_receiver::Gst;
    ///
    /// let gst = Gst::new(1177, 175767);
    /// let gst_next_page = gst.add_seconds(2);
    /// assert_eq!(gst_next_page.wn(), 1177);
    /// assert_eq!(gst_next_page.tow(), 175769);
    ///
    /// assert_eq!(gst_next_page.add_seconds(-2), gst);
    /// assert_eq!(Gst::new(4095, 604799).add_seconds(1), Gst::new(0, 0));
    /// ```
    pub fn add_seconds(&self, seconds: i32) -> Self {
        Self::from_total_seconds(self.total_seconds() + i64::from(seconds))
    }

    /// Adds `subframes` 30-second subframes to the GST.
    ///
    /// # Examples
    ///
    /// ```
    /// use osnma_receiver::Gst;
    ///
    /// let gst = Gst::new(1177, 175767);
    /// let gst2 = gst.add_subframes(3);
    /// assert_eq!(gst2.tow(), 175857);
    /// assert_eq!(gst2.add_subframes(-3), gst);
    /// ```
    pub fn add_subframes(&self, subframes: i32) -> Self {
        self.add_seconds(subframes * SECS_PER_SUBFRAME as i32)
    }

    /// Returns the number of seconds elapsed from `earlier` to `self`.
    ///
    /// The result is negative if `earlier` is actually later than `self`. The
    /// difference is computed modulo the GST rollover period of 4096 weeks,
    /// and is the representative with the smallest absolute value.
    ///
    /// # Examples
    ///
    /// ```
    /// use osnma_receiver::Gst;
    ///
    /// let a = Gst::new(4095, 604790);
    /// let b = Gst::new(0, 10);
    /// assert_eq!(b.seconds_since(a), 20);
    /// assert_eq!(a.seconds_since(b), -20);
    /// ```
    pub fn seconds_since(&self, earlier: Gst) -> i64 {
        let period = WN_MODULUS * i64::from(SECS_IN_WEEK);
        let diff = (self.total_seconds() - earlier.total_seconds()).rem_euclid(period);
        if diff > period / 2 {
            diff - period
        } else {
            diff
        }
    }

    /// Returns the GST at the start of the subframe that contains `self`.
    ///
    /// # Examples
    ///
    /// ```
    /// use osnma_receiver::Gst;
    ///
    /// let gst = Gst::new(1177, 175767);
    /// let subframe = gst.gst_subframe();
    /// assert_eq!(subframe.wn(), 1177);
    /// assert_eq!(subframe.tow(), 175740);
    /// ```
    pub fn gst_subframe(&self) -> Self {
        Gst {
            wn: self.wn,
            tow: self.tow / SECS_PER_SUBFRAME * SECS_PER_SUBFRAME,
        }
    }

    /// Returns `true` if `self` corresponds to the start of a subframe.
    ///
    /// # Examples
    /// ```
    /// use osnma_receiver::Gst;
    ///
    /// let gst = Gst::new(1177, 175767);
    /// assert!(!gst.is_subframe());
    /// assert!(gst.gst_subframe().is_subframe());
    /// ```
    pub fn is_subframe(&self) -> bool {
        self.tow % SECS_PER_SUBFRAME == 0
    }

    /// Returns the position of the page inside its subframe (0 to 14).
    pub fn page_in_subframe(&self) -> usize {
        ((self.tow % SECS_PER_SUBFRAME) / 2) as usize
    }
}

impl fmt::Display for Gst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GST({}, {})", self.wn, self.tow)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn week_rollover() {
        let gst = Gst::new(1177, 604790);
        let next = gst.add_seconds(20);
        assert_eq!(next, Gst::new(1178, 10));
        assert_eq!(next.add_seconds(-20), gst);
        assert_eq!(next.seconds_since(gst), 20);
    }

    #[test]
    fn wn_modulus() {
        assert_eq!(Gst::new(4096 + 3, 0).wn(), 3);
        assert_eq!(Gst::new(0, 5).add_seconds(-10), Gst::new(4095, 604795));
    }

    #[test]
    fn page_position() {
        assert_eq!(Gst::new(1, 30).page_in_subframe(), 0);
        assert_eq!(Gst::new(1, 32).page_in_subframe(), 1);
        assert_eq!(Gst::new(1, 58).page_in_subframe(), 14);
        assert_eq!(Gst::new(1, 59).page_in_subframe(), 14);
    }

    #[test]
    fn try_new_range() {
        assert!(Gst::try_new(10, 604800).is_none());
        assert!(Gst::try_new(10, 604799).is_some());
    }
}
