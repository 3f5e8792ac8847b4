//! QR code encoding functionality.
//!
//! This module implements the QR Code Model 2 symbol construction used by both
//! the ASCII data source and the PNG resource. It supports versions 1 to 40,
//! all four error correction levels, and the numeric, alphanumeric and byte
//! data modes. Symbols are immutable once built.

/// A QR Code symbol, a square grid of dark and light modules.
///
/// # Example
///
/// ```rust
/// use qrcode_provider::qrcode::{QrCode, QrCodeEcc};
///
/// let qr = QrCode::encode_text("qrcode", QrCodeEcc::Medium).unwrap();
/// assert_eq!(qr.version().value(), 1);
/// assert_eq!(qr.size(), 21);
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QrCode {
    /// The width and height of this QR Code, measured in modules, between
    /// 21 and 177 (inclusive). This is equal to version * 4 + 17.
    size: u8,

    /// The modules of this QR Code (0 = light, 1 = dark), packed bitwise into
    /// bytes in row-major order. Accessed through `get_module()`.
    modules: Vec<u8>,
}

impl QrCode {
    /// Encodes text with the given error correction level.
    ///
    /// Uses the smallest version that fits, never raises the error correction
    /// level on its own, and picks the mask with the lowest penalty score.
    pub fn encode_text(text: &str, ecl: QrCodeEcc) -> Result<Self, DataTooLong> {
        Self::encode_text_advanced(text, ecl, Version::MIN, Version::MAX, None, false)
    }

    /// Encodes text with full control over the encoding parameters.
    ///
    /// If `boostecl` is `true`, the error correction level may be raised when
    /// doing so does not increase the version. The `mask` can be `None` for
    /// automatic selection or a fixed pattern.
    pub fn encode_text_advanced(
        text: &str,
        ecl: QrCodeEcc,
        minversion: Version,
        maxversion: Version,
        mask: Option<Mask>,
        boostecl: bool,
    ) -> Result<Self, DataTooLong> {
        let segs: Vec<QrSegment> = if text.is_empty() {
            Vec::new()
        } else {
            vec![QrSegment::for_text(text)]
        };
        Self::encode_segments(&segs, ecl, minversion, maxversion, mask, boostecl)
    }

    /// Encodes a list of segments into a symbol.
    pub fn encode_segments(
        segs: &[QrSegment],
        mut ecl: QrCodeEcc,
        minversion: Version,
        maxversion: Version,
        mask: Option<Mask>,
        boostecl: bool,
    ) -> Result<Self, DataTooLong> {
        assert!(minversion <= maxversion, "Invalid version range");

        // Find the minimal version number to use
        let mut version = minversion;
        let datausedbits: usize = loop {
            let datacapacitybits = Self::num_data_codewords(version, ecl) * 8;
            let dataused = QrSegment::total_bits(segs, version);
            match dataused {
                Some(n) if n <= datacapacitybits => break n,
                _ if version >= maxversion => {
                    return Err(match dataused {
                        None => DataTooLong::SegmentTooLong,
                        Some(n) => DataTooLong::DataOverCapacity(n, datacapacitybits),
                    });
                }
                _ => version = Version::new(version.value() + 1),
            }
        };

        for newecl in [QrCodeEcc::Medium, QrCodeEcc::Quartile, QrCodeEcc::High] {
            if boostecl && datausedbits <= Self::num_data_codewords(version, newecl) * 8 {
                ecl = newecl;
            }
        }

        // Mode indicator, character count and payload for every segment
        let datacapacitybits = Self::num_data_codewords(version, ecl) * 8;
        let mut bb = BitBuffer::default();
        for seg in segs {
            bb.append_bits(seg.mode.mode_bits(), 4);
            bb.append_bits(seg.numchars as u32, seg.mode.num_char_count_bits(version));
            bb.0.extend_from_slice(&seg.data);
        }
        debug_assert_eq!(bb.len(), datausedbits);

        // Terminator, then pad to a byte boundary
        let numzerobits = (datacapacitybits - bb.len()).min(4);
        bb.append_bits(0, numzerobits as u8);
        let numzerobits = bb.len().wrapping_neg() & 7;
        bb.append_bits(0, numzerobits as u8);
        debug_assert_eq!(bb.len() % 8, 0);

        for &padbyte in [0xec, 0x11].iter().cycle() {
            if bb.len() >= datacapacitybits {
                break;
            }
            bb.append_bits(padbyte, 8);
        }

        Ok(Self::encode_codewords(version, ecl, &bb.to_bytes(), mask))
    }

    /// Builds a symbol from already padded data codewords.
    pub fn encode_codewords(
        version: Version,
        ecl: QrCodeEcc,
        datacodewords: &[u8],
        mask: Option<Mask>,
    ) -> Self {
        let allcodewords = Self::add_ecc_and_interleave(datacodewords, version, ecl);

        let mut result = Self::function_modules_marked(version);
        result.draw_codewords(&allcodewords);
        result.draw_light_function_modules();
        let funcmods = Self::function_modules_marked(version);

        let mask = mask.unwrap_or_else(|| {
            let mut best = (i32::MAX, Mask::new(0));
            for i in 0u8..8 {
                let candidate = Mask::new(i);
                result.apply_mask(&funcmods, candidate);
                result.draw_format_bits(ecl, candidate);
                let penalty = result.penalty_score();
                if penalty < best.0 {
                    best = (penalty, candidate);
                }
                // XOR undoes the mask
                result.apply_mask(&funcmods, candidate);
            }
            best.1
        });
        result.apply_mask(&funcmods, mask);
        result.draw_format_bits(ecl, mask);
        result
    }

    /// Returns this QR Code's version, in the range [1, 40].
    pub fn version(&self) -> Version {
        Version::new((self.size - 17) / 4)
    }

    /// Returns this QR Code's size, in the range [21, 177].
    pub fn size(&self) -> i32 {
        i32::from(self.size)
    }

    /// Returns the error correction level recorded in the format bits.
    pub fn error_correction_level(&self) -> QrCodeEcc {
        match self.format_data() >> 3 {
            1 => QrCodeEcc::Low,
            0 => QrCodeEcc::Medium,
            3 => QrCodeEcc::Quartile,
            _ => QrCodeEcc::High,
        }
    }

    /// Returns the mask recorded in the format bits.
    pub fn mask(&self) -> Mask {
        Mask::new(self.format_data() & 7)
    }

    /// Returns the color of the module at the given coordinates.
    ///
    /// Returns `true` for dark modules and `false` for light modules.
    /// Coordinates outside the symbol are light, which is what renderers rely
    /// on to draw the quiet zone.
    pub fn get_module(&self, x: i32, y: i32) -> bool {
        let range = 0..self.size();
        range.contains(&x) && range.contains(&y) && self.module_at(x as u8, y as u8)
    }

    fn module_at(&self, x: u8, y: u8) -> bool {
        let index = usize::from(y) * usize::from(self.size) + usize::from(x);
        get_bit(self.modules[index >> 3].into(), (index & 7) as u8)
    }

    fn set_module(&mut self, x: u8, y: u8, isdark: bool) {
        let index = usize::from(y) * usize::from(self.size) + usize::from(x);
        let bit = 1u8 << (index & 7);
        if isdark {
            self.modules[index >> 3] |= bit;
        } else {
            self.modules[index >> 3] &= !bit;
        }
    }

    fn set_module_unbounded(&mut self, x: i32, y: i32, isdark: bool) {
        let range = 0..self.size();
        if range.contains(&x) && range.contains(&y) {
            self.set_module(x as u8, y as u8, isdark);
        }
    }

    fn format_data(&self) -> u8 {
        let bits = (0u8..15)
            .filter(|&i| {
                let (x, y) = format_bit_position(i);
                self.module_at(x, y)
            })
            .fold(0u32, |acc, i| acc | (1 << i));
        ((bits ^ 0x5412) >> 10) as u8
    }

    fn add_ecc_and_interleave(data: &[u8], ver: Version, ecl: QrCodeEcc) -> Vec<u8> {
        assert_eq!(data.len(), Self::num_data_codewords(ver, ecl));
        let numblocks = table_get(&NUM_ERROR_CORRECTION_BLOCKS, ver, ecl);
        let blockecclen = table_get(&ECC_CODEWORDS_PER_BLOCK, ver, ecl);
        let rawcodewords = Self::num_raw_data_modules(ver) / 8;
        let numshortblocks = numblocks - (rawcodewords % numblocks);
        let shortblockdatalen = rawcodewords / numblocks - blockecclen;

        let rs = ReedSolomonGenerator::new(blockecclen);
        let mut result = vec![0u8; rawcodewords];
        let mut rest = data;
        for i in 0..numblocks {
            let datlen = shortblockdatalen + usize::from(i >= numshortblocks);
            let (block, tail) = rest.split_at(datlen);
            let ecc = rs.remainder(block);

            let mut k = i;
            for (j, &byte) in block.iter().enumerate() {
                // Short blocks have no codeword in the last data column
                if j == shortblockdatalen {
                    k -= numshortblocks;
                }
                result[k] = byte;
                k += numblocks;
            }
            let mut k = data.len() + i;
            for &byte in &ecc {
                result[k] = byte;
                k += numblocks;
            }
            rest = tail;
        }
        debug_assert!(rest.is_empty());
        result
    }

    /// Returns a symbol of the given version with every function module dark
    /// and everything else light.
    fn function_modules_marked(ver: Version) -> Self {
        let size = ver.value() * 4 + 17;
        let mut result = Self {
            size,
            modules: vec![0u8; ver.module_bytes()],
        };

        // Timing patterns
        result.fill_rectangle(6, 0, 1, size);
        result.fill_rectangle(0, 6, size, 1);

        // Finder patterns with separators and format areas
        result.fill_rectangle(0, 0, 9, 9);
        result.fill_rectangle(size - 8, 0, 8, 9);
        result.fill_rectangle(0, size - 8, 9, 8);

        for (x, y) in result.alignment_centers() {
            result.fill_rectangle(x - 2, y - 2, 5, 5);
        }

        // Version information
        if ver.value() >= 7 {
            result.fill_rectangle(size - 11, 0, 3, 6);
            result.fill_rectangle(0, size - 11, 6, 3);
        }
        result
    }

    /// Clears the light parts of the function patterns that
    /// `function_modules_marked` painted solid, and draws version bits.
    fn draw_light_function_modules(&mut self) {
        let size = self.size;
        for i in (7..size - 7).step_by(2) {
            self.set_module(6, i, false);
            self.set_module(i, 6, false);
        }

        let far = i32::from(size) - 4;
        for dy in -4i32..=4 {
            for dx in -4i32..=4 {
                let dist = dx.abs().max(dy.abs());
                if dist == 2 || dist == 4 {
                    self.set_module_unbounded(3 + dx, 3 + dy, false);
                    self.set_module_unbounded(far + dx, 3 + dy, false);
                    self.set_module_unbounded(3 + dx, far + dy, false);
                }
            }
        }

        for (x, y) in self.alignment_centers() {
            for dy in 0..3u8 {
                for dx in 0..3u8 {
                    self.set_module(x + dx - 1, y + dy - 1, dx == 1 && dy == 1);
                }
            }
        }

        let ver = u32::from(self.version().value());
        if ver >= 7 {
            let mut rem = ver;
            for _ in 0..12 {
                rem = (rem << 1) ^ ((rem >> 11) * 0x1f25);
            }
            let bits = (ver << 12) | rem;
            for i in 0u8..18 {
                let bit = get_bit(bits, i);
                let a = size - 11 + (i % 3);
                let b = i / 3;
                self.set_module(a, b, bit);
                self.set_module(b, a, bit);
            }
        }
    }

    fn draw_format_bits(&mut self, ecl: QrCodeEcc, mask: Mask) {
        let data = u32::from((ecl.format_bits() << 3) | mask.value());
        let mut rem = data;
        for _ in 0..10 {
            rem = (rem << 1) ^ ((rem >> 9) * 0x537);
        }
        let bits = ((data << 10) | rem) ^ 0x5412;

        // First copy, around the top-left finder
        for i in 0u8..15 {
            let (x, y) = format_bit_position(i);
            self.set_module(x, y, get_bit(bits, i));
        }

        // Second copy, split between the other two finders
        let size = self.size;
        for i in 0u8..8 {
            self.set_module(size - 1 - i, 8, get_bit(bits, i));
        }
        for i in 8u8..15 {
            self.set_module(8, size - 15 + i, get_bit(bits, i));
        }
        self.set_module(8, size - 8, true);
    }

    fn fill_rectangle(&mut self, left: u8, top: u8, width: u8, height: u8) {
        for dy in 0..height {
            for dx in 0..width {
                self.set_module(left + dx, top + dy, true);
            }
        }
    }

    fn draw_codewords(&mut self, data: &[u8]) {
        assert_eq!(
            data.len(),
            Self::num_raw_data_modules(self.version()) / 8,
            "Illegal argument"
        );
        let size = self.size();
        let totalbits = data.len() * 8;
        let mut i: usize = 0;
        let mut right = size - 1;
        // Zigzag through column pairs, skipping the vertical timing column
        while right >= 1 {
            if right == 6 {
                right = 5;
            }
            let upward = ((right + 1) & 2) == 0;
            for vert in 0..size {
                let y = (if upward { size - 1 - vert } else { vert }) as u8;
                for j in 0..2 {
                    let x = (right - j) as u8;
                    if !self.module_at(x, y) && i < totalbits {
                        self.set_module(x, y, get_bit(data[i >> 3].into(), 7 - (i & 7) as u8));
                        i += 1;
                    }
                }
            }
            right -= 2;
        }
        debug_assert_eq!(i, totalbits);
    }

    fn apply_mask(&mut self, functionmodules: &QrCode, mask: Mask) {
        for y in 0..self.size {
            for x in 0..self.size {
                if functionmodules.module_at(x, y) {
                    continue;
                }
                let (xi, yi) = (i32::from(x), i32::from(y));
                let invert = match mask.value() {
                    0 => (xi + yi) % 2 == 0,
                    1 => yi % 2 == 0,
                    2 => xi % 3 == 0,
                    3 => (xi + yi) % 3 == 0,
                    4 => (xi / 3 + yi / 2) % 2 == 0,
                    5 => (xi * yi) % 2 + (xi * yi) % 3 == 0,
                    6 => ((xi * yi) % 2 + (xi * yi) % 3) % 2 == 0,
                    _ => ((xi + yi) % 2 + (xi * yi) % 3) % 2 == 0,
                };
                let current = self.module_at(x, y);
                self.set_module(x, y, current ^ invert);
            }
        }
    }

    fn penalty_score(&self) -> i32 {
        let size = self.size;
        let mut result: i32 = 0;

        // Runs and finder-like patterns, rows then columns
        for horizontal in [true, false] {
            for a in 0..size {
                let mut runcolor = false;
                let mut runlen: i32 = 0;
                let mut history = FinderPenalty::new(size);
                for b in 0..size {
                    let color = if horizontal {
                        self.module_at(b, a)
                    } else {
                        self.module_at(a, b)
                    };
                    if color == runcolor {
                        runlen += 1;
                        if runlen == 5 {
                            result += PENALTY_N1;
                        } else if runlen > 5 {
                            result += 1;
                        }
                    } else {
                        history.add_history(runlen);
                        if !runcolor {
                            result += history.count_patterns() * PENALTY_N3;
                        }
                        runcolor = color;
                        runlen = 1;
                    }
                }
                result += history.terminate_and_count(runcolor, runlen) * PENALTY_N3;
            }
        }

        // 2x2 blocks of one color
        for y in 0..size - 1 {
            for x in 0..size - 1 {
                let color = self.module_at(x, y);
                if color == self.module_at(x + 1, y)
                    && color == self.module_at(x, y + 1)
                    && color == self.module_at(x + 1, y + 1)
                {
                    result += PENALTY_N2;
                }
            }
        }

        // Dark/light balance
        let dark = self.modules.iter().map(|b| b.count_ones()).sum::<u32>() as i32;
        let total = i32::from(size) * i32::from(size);
        let k = ((dark * 20 - total * 10).abs() + total - 1) / total - 1;
        result + k * PENALTY_N4
    }

    /// Alignment pattern positions along one axis, ascending.
    fn alignment_pattern_positions(&self) -> Vec<u8> {
        let ver = self.version().value();
        if ver == 1 {
            return Vec::new();
        }
        let numalign = ver / 7 + 2;
        let step = if ver == 32 {
            26
        } else {
            ((ver * 4 + numalign * 2 + 1) / (numalign * 2 - 2)) * 2
        };
        let mut result: Vec<u8> = (0..numalign - 1).map(|i| self.size - 7 - i * step).collect();
        result.push(6);
        result.reverse();
        result
    }

    /// Alignment pattern centers, leaving out the three that would overlap a
    /// finder pattern.
    fn alignment_centers(&self) -> Vec<(u8, u8)> {
        let positions = self.alignment_pattern_positions();
        let last = positions.len().saturating_sub(1);
        let mut centers = Vec::new();
        for (i, &x) in positions.iter().enumerate() {
            for (j, &y) in positions.iter().enumerate() {
                let on_finder =
                    (i == 0 && j == 0) || (i == 0 && j == last) || (i == last && j == 0);
                if !on_finder {
                    centers.push((x, y));
                }
            }
        }
        centers
    }

    fn num_raw_data_modules(ver: Version) -> usize {
        let ver = usize::from(ver.value());
        let mut result = (16 * ver + 128) * ver + 64;
        if ver >= 2 {
            let numalign = ver / 7 + 2;
            result -= (25 * numalign - 10) * numalign - 55;
            if ver >= 7 {
                result -= 36;
            }
        }
        result
    }

    fn num_data_codewords(ver: Version, ecl: QrCodeEcc) -> usize {
        Self::num_raw_data_modules(ver) / 8
            - table_get(&ECC_CODEWORDS_PER_BLOCK, ver, ecl)
                * table_get(&NUM_ERROR_CORRECTION_BLOCKS, ver, ecl)
    }
}

/// Coordinates of format bit `i` in the copy next to the top-left finder.
fn format_bit_position(i: u8) -> (u8, u8) {
    match i {
        0..=5 => (8, i),
        6 => (8, 7),
        7 => (8, 8),
        8 => (7, 8),
        _ => (14 - i, 8),
    }
}

fn table_get(table: &'static [[i8; 41]; 4], ver: Version, ecl: QrCodeEcc) -> usize {
    table[ecl.ordinal()][usize::from(ver.value())] as usize
}

struct ReedSolomonGenerator {
    divisor: Vec<u8>,
}

impl ReedSolomonGenerator {
    fn new(degree: usize) -> Self {
        assert!((1..=30).contains(&degree), "Degree out of range");
        let mut divisor = vec![0u8; degree];
        divisor[degree - 1] = 1;
        let mut root: u8 = 1;
        for _ in 0..degree {
            for j in 0..degree {
                divisor[j] = Self::multiply(divisor[j], root);
                if j + 1 < degree {
                    divisor[j] ^= divisor[j + 1];
                }
            }
            root = Self::multiply(root, 0x02);
        }
        Self { divisor }
    }

    fn remainder(&self, data: &[u8]) -> Vec<u8> {
        let mut result = vec![0u8; self.divisor.len()];
        for &b in data {
            let factor = b ^ result.remove(0);
            result.push(0);
            for (x, &y) in result.iter_mut().zip(&self.divisor) {
                *x ^= Self::multiply(y, factor);
            }
        }
        result
    }

    /// Multiplication in GF(2^8) modulo x^8 + x^4 + x^3 + x^2 + 1.
    fn multiply(x: u8, y: u8) -> u8 {
        let mut z: u8 = 0;
        for i in (0..8).rev() {
            z = (z << 1) ^ ((z >> 7) * 0x1d);
            z ^= ((y >> i) & 1) * x;
        }
        z
    }
}

struct FinderPenalty {
    qr_size: i32,
    run_history: [i32; 7],
}

impl FinderPenalty {
    fn new(size: u8) -> Self {
        Self {
            qr_size: i32::from(size),
            run_history: [0; 7],
        }
    }

    fn add_history(&mut self, mut currentrunlength: i32) {
        if self.run_history[0] == 0 {
            // Light border outside the symbol
            currentrunlength += self.qr_size;
        }
        self.run_history.copy_within(0..6, 1);
        self.run_history[0] = currentrunlength;
    }

    fn count_patterns(&self) -> i32 {
        let rh = &self.run_history;
        let n = rh[1];
        let core = n > 0 && rh[2] == n && rh[3] == n * 3 && rh[4] == n && rh[5] == n;
        i32::from(core && rh[0] >= n * 4 && rh[6] >= n)
            + i32::from(core && rh[6] >= n * 4 && rh[0] >= n)
    }

    fn terminate_and_count(mut self, currentruncolor: bool, mut currentrunlength: i32) -> i32 {
        if currentruncolor {
            self.add_history(currentrunlength);
            currentrunlength = 0;
        }
        currentrunlength += self.qr_size;
        self.add_history(currentrunlength);
        self.count_patterns()
    }
}

const PENALTY_N1: i32 = 3;
const PENALTY_N2: i32 = 3;
const PENALTY_N3: i32 = 40;
const PENALTY_N4: i32 = 10;

static ECC_CODEWORDS_PER_BLOCK: [[i8; 41]; 4] = [
    [
        -1, 7, 10, 15, 20, 26, 18, 20, 24, 30, 18, 20, 24, 26, 30, 22, 24, 28, 30, 28, 28, 28, 28,
        30, 30, 26, 28, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30,
    ], // Low
    [
        -1, 10, 16, 26, 18, 24, 16, 18, 22, 22, 26, 30, 22, 22, 24, 24, 28, 28, 26, 26, 26, 26, 28,
        28, 28, 28, 28, 28, 28, 28, 28, 28, 28, 28, 28, 28, 28, 28, 28, 28, 28,
    ], // Medium
    [
        -1, 13, 22, 18, 26, 18, 24, 18, 22, 20, 24, 28, 26, 24, 20, 30, 24, 28, 28, 26, 30, 28, 30,
        30, 30, 30, 28, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30,
    ], // Quartile
    [
        -1, 17, 28, 22, 16, 22, 28, 26, 26, 24, 28, 24, 28, 22, 24, 24, 30, 28, 28, 26, 28, 30, 24,
        30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30,
    ], // High
];

static NUM_ERROR_CORRECTION_BLOCKS: [[i8; 41]; 4] = [
    [
        -1, 1, 1, 1, 1, 1, 2, 2, 2, 2, 4, 4, 4, 4, 4, 6, 6, 6, 6, 7, 8, 8, 9, 9, 10, 12, 12, 12,
        13, 14, 15, 16, 17, 18, 19, 19, 20, 21, 22, 24, 25,
    ], // Low
    [
        -1, 1, 1, 1, 2, 2, 4, 4, 4, 5, 5, 5, 8, 9, 9, 10, 10, 11, 13, 14, 16, 17, 17, 18, 20, 21,
        23, 25, 26, 28, 29, 31, 33, 35, 37, 38, 40, 43, 45, 47, 49,
    ], // Medium
    [
        -1, 1, 1, 2, 2, 4, 4, 6, 6, 8, 8, 8, 10, 12, 16, 12, 17, 16, 18, 21, 20, 23, 23, 25, 27,
        29, 34, 34, 35, 38, 40, 43, 45, 48, 51, 53, 56, 59, 62, 65, 68,
    ], // Quartile
    [
        -1, 1, 1, 2, 4, 4, 4, 5, 6, 8, 8, 11, 11, 16, 16, 18, 16, 19, 21, 25, 25, 25, 34, 30, 32,
        35, 37, 40, 42, 45, 48, 51, 54, 57, 60, 63, 66, 70, 74, 77, 81,
    ], // High
];

/// Error correction level for a QR code.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug, Hash)]
pub enum QrCodeEcc {
    /// Tolerates ~7% erroneous codewords.
    Low,
    /// Tolerates ~15% erroneous codewords.
    Medium,
    /// Tolerates ~25% erroneous codewords.
    Quartile,
    /// Tolerates ~30% erroneous codewords.
    High,
}

impl QrCodeEcc {
    fn ordinal(self) -> usize {
        match self {
            QrCodeEcc::Low => 0,
            QrCodeEcc::Medium => 1,
            QrCodeEcc::Quartile => 2,
            QrCodeEcc::High => 3,
        }
    }

    /// The 2-bit value stored in the format information.
    fn format_bits(self) -> u8 {
        match self {
            QrCodeEcc::Low => 1,
            QrCodeEcc::Medium => 0,
            QrCodeEcc::Quartile => 3,
            QrCodeEcc::High => 2,
        }
    }
}

/// A segment of data in a QR code.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QrSegment {
    mode: QrSegmentMode,
    numchars: usize,
    data: Vec<bool>,
}

impl QrSegment {
    /// Builds a single segment for `text` in the most compact mode that can
    /// represent all of it.
    pub fn for_text(text: &str) -> Self {
        Self::make_numeric(text)
            .or_else(|| Self::make_alphanumeric(text))
            .unwrap_or_else(|| Self::make_bytes(text.as_bytes()))
    }

    /// Creates a byte mode segment.
    pub fn make_bytes(data: &[u8]) -> Self {
        let mut bb = BitBuffer::default();
        for &b in data {
            bb.append_bits(u32::from(b), 8);
        }
        Self {
            mode: QrSegmentMode::Byte,
            numchars: data.len(),
            data: bb.0,
        }
    }

    /// Creates a numeric mode segment, or `None` if `text` has anything
    /// other than the digits 0-9.
    pub fn make_numeric(text: &str) -> Option<Self> {
        if !Self::is_numeric(text) {
            return None;
        }
        let mut bb = BitBuffer::default();
        for chunk in text.as_bytes().chunks(3) {
            let value = chunk.iter().fold(0u32, |acc, &b| acc * 10 + u32::from(b - b'0'));
            bb.append_bits(value, chunk.len() as u8 * 3 + 1);
        }
        Some(Self {
            mode: QrSegmentMode::Numeric,
            numchars: text.len(),
            data: bb.0,
        })
    }

    /// Creates an alphanumeric mode segment, or `None` if `text` has a
    /// character outside `0-9`, `A-Z`, space and `$%*+-./:`.
    pub fn make_alphanumeric(text: &str) -> Option<Self> {
        let indices = text
            .chars()
            .map(|c| ALPHANUMERIC_CHARSET.find(c).map(|i| i as u32))
            .collect::<Option<Vec<u32>>>()?;
        let mut bb = BitBuffer::default();
        for pair in indices.chunks(2) {
            match *pair {
                [a, b] => bb.append_bits(a * 45 + b, 11),
                [a] => bb.append_bits(a, 6),
                _ => {}
            }
        }
        Some(Self {
            mode: QrSegmentMode::Alphanumeric,
            numchars: text.len(),
            data: bb.0,
        })
    }

    pub fn mode(&self) -> QrSegmentMode {
        self.mode
    }

    pub fn num_chars(&self) -> usize {
        self.numchars
    }

    fn total_bits(segs: &[Self], version: Version) -> Option<usize> {
        let mut result: usize = 0;
        for seg in segs {
            let ccbits = seg.mode.num_char_count_bits(version);
            if seg.numchars >= 1usize << ccbits {
                return None;
            }
            result = result.checked_add(4 + usize::from(ccbits))?;
            result = result.checked_add(seg.data.len())?;
        }
        Some(result)
    }

    pub fn is_numeric(text: &str) -> bool {
        text.chars().all(|c| c.is_ascii_digit())
    }

    pub fn is_alphanumeric(text: &str) -> bool {
        text.chars().all(|c| ALPHANUMERIC_CHARSET.contains(c))
    }
}

static ALPHANUMERIC_CHARSET: &str = "0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ $%*+-./:";

/// Data mode of a segment.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum QrSegmentMode {
    Numeric,
    Alphanumeric,
    Byte,
}

impl QrSegmentMode {
    fn mode_bits(self) -> u32 {
        match self {
            QrSegmentMode::Numeric => 0x1,
            QrSegmentMode::Alphanumeric => 0x2,
            QrSegmentMode::Byte => 0x4,
        }
    }

    fn num_char_count_bits(self, ver: Version) -> u8 {
        let widths = match self {
            QrSegmentMode::Numeric => [10, 12, 14],
            QrSegmentMode::Alphanumeric => [9, 11, 13],
            QrSegmentMode::Byte => [8, 16, 16],
        };
        widths[usize::from((ver.value() + 7) / 17)]
    }
}

/// An appendable sequence of bits.
#[derive(Clone, Debug, Default)]
struct BitBuffer(Vec<bool>);

impl BitBuffer {
    fn len(&self) -> usize {
        self.0.len()
    }

    fn append_bits(&mut self, val: u32, len: u8) {
        assert!(len <= 31 && (val >> len) == 0, "Value out of range");
        self.0.extend((0..len).rev().map(|i| get_bit(val, i)));
    }

    /// Packs the bits big-endian into bytes; the length must be a multiple of 8.
    fn to_bytes(&self) -> Vec<u8> {
        self.0
            .chunks(8)
            .map(|byte| byte.iter().fold(0u8, |acc, &bit| (acc << 1) | u8::from(bit)))
            .collect()
    }
}

/// The data does not fit in any version of the allowed range.
///
/// Callers can lower the error correction level, shorten the text, or
/// surface the error to the user, which is what the provider does.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DataTooLong {
    /// A segment has more characters than its count field can hold.
    #[error("segment too long")]
    SegmentTooLong,
    /// Data length exceeds capacity.
    #[error("data length = {0} bits, max capacity = {1} bits")]
    DataOverCapacity(usize, usize),
}

/// A QR code version (1-40).
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct Version(u8);

impl Version {
    /// The minimum version number supported in the QR Code Model 2 standard.
    pub const MIN: Version = Version(1);

    /// The maximum version number supported in the QR Code Model 2 standard.
    pub const MAX: Version = Version(40);

    /// Creates a version object from the given number.
    ///
    /// # Panics
    ///
    /// Panics if the number is outside the range [1, 40].
    pub const fn new(ver: u8) -> Self {
        assert!(
            Version::MIN.value() <= ver && ver <= Version::MAX.value(),
            "Version number out of range"
        );
        Self(ver)
    }

    /// Returns the value, which is in the range [1, 40].
    pub const fn value(self) -> u8 {
        self.0
    }

    /// Bytes needed to hold every module of a symbol of this version.
    const fn module_bytes(self) -> usize {
        let sidelen = (self.0 as usize) * 4 + 17;
        (sidelen * sidelen).div_ceil(8)
    }
}

/// A mask pattern (0-7).
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct Mask(u8);

impl Mask {
    /// Creates a mask object from the given number.
    ///
    /// # Panics
    ///
    /// Panics if the number is outside the range [0, 7].
    pub const fn new(mask: u8) -> Self {
        assert!(mask <= 7, "Mask value out of range");
        Self(mask)
    }

    /// Returns the value, which is in the range [0, 7].
    pub const fn value(self) -> u8 {
        self.0
    }
}

fn get_bit(x: u32, i: u8) -> bool {
    ((x >> i) & 1) != 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_numeric() {
        assert!(QrSegment::is_numeric("1234567890"));
        assert!(!QrSegment::is_numeric("1234abc"));
    }

    #[test]
    fn test_is_alphanumeric() {
        assert!(QrSegment::is_alphanumeric("HELLO WORLD"));
        assert!(!QrSegment::is_alphanumeric("Hello World"));
    }

    #[test]
    fn test_for_text_picks_compact_mode() {
        assert_eq!(QrSegment::for_text("0123").mode(), QrSegmentMode::Numeric);
        assert_eq!(QrSegment::for_text("HTTP://X").mode(), QrSegmentMode::Alphanumeric);
        assert_eq!(QrSegment::for_text("qrcode").mode(), QrSegmentMode::Byte);
        assert_eq!(QrSegment::for_text("héllo").num_chars(), 6);
    }

    #[test]
    fn test_segment_bit_lengths() {
        // 3 digits -> 10 bits, 2 digits -> 7 bits
        assert_eq!(QrSegment::make_numeric("12345").unwrap().data.len(), 17);
        // pair -> 11 bits, single -> 6 bits
        assert_eq!(QrSegment::make_alphanumeric("ABC").unwrap().data.len(), 17);
        assert!(QrSegment::make_alphanumeric("abc").is_none());
    }

    #[test]
    fn test_short_text_fits_version_one() {
        let qr = QrCode::encode_text("qrcode", QrCodeEcc::Medium).unwrap();
        assert_eq!(qr.version(), Version::new(1));
        assert_eq!(qr.size(), 21);
        assert_eq!(qr.error_correction_level(), QrCodeEcc::Medium);
    }

    #[test]
    fn test_empty_text_encodes() {
        let qr = QrCode::encode_text("", QrCodeEcc::High).unwrap();
        assert_eq!(qr.version(), Version::MIN);
    }

    #[test]
    fn test_version_grows_with_data() {
        let text = "a".repeat(100);
        let qr = QrCode::encode_text(&text, QrCodeEcc::Medium).unwrap();
        // 100 bytes at M needs version 6 (108 data codewords)
        assert_eq!(qr.version(), Version::new(6));
        assert_eq!(qr.size(), 41);
    }

    #[test]
    fn test_data_too_long() {
        let text = "a".repeat(2000);
        let err = QrCode::encode_text(&text, QrCodeEcc::High).unwrap_err();
        assert!(matches!(err, DataTooLong::DataOverCapacity(_, _)));
        assert!(QrCode::encode_text(&text, QrCodeEcc::Low).is_ok());
    }

    #[test]
    fn test_format_bits_round_trip() {
        for ecl in [QrCodeEcc::Low, QrCodeEcc::Medium, QrCodeEcc::Quartile, QrCodeEcc::High] {
            for m in 0..8 {
                let qr = QrCode::encode_text_advanced(
                    "HELLO",
                    ecl,
                    Version::MIN,
                    Version::MAX,
                    Some(Mask::new(m)),
                    false,
                )
                .unwrap();
                assert_eq!(qr.error_correction_level(), ecl);
                assert_eq!(qr.mask(), Mask::new(m));
            }
        }
    }

    #[test]
    fn test_boost_ecl() {
        let qr = QrCode::encode_text_advanced(
            "1",
            QrCodeEcc::Low,
            Version::MIN,
            Version::MAX,
            None,
            true,
        )
        .unwrap();
        assert_eq!(qr.error_correction_level(), QrCodeEcc::High);
    }

    #[test]
    fn test_finder_and_timing_patterns() {
        let qr = QrCode::encode_text("qrcode", QrCodeEcc::Medium).unwrap();
        let last = qr.size() - 1;
        for (x, y) in [(0, 0), (last, 0), (0, last), (3, 3), (last - 3, 3)] {
            assert!(qr.get_module(x, y), "expected dark module at ({x}, {y})");
        }
        // Separators and the ring inside each finder are light
        assert!(!qr.get_module(7, 7));
        assert!(!qr.get_module(1, 1));
        for i in 8..qr.size() - 8 {
            assert_eq!(qr.get_module(i, 6), i % 2 == 0);
            assert_eq!(qr.get_module(6, i), i % 2 == 0);
        }
        assert!(!qr.get_module(-1, 0));
        assert!(!qr.get_module(0, qr.size()));
    }

    #[test]
    fn test_alignment_pattern_positions() {
        let at = |v: u8| {
            QrCode::encode_text_advanced("1", QrCodeEcc::Low, Version::new(v), Version::MAX, None, false)
                .unwrap()
                .alignment_pattern_positions()
        };
        assert!(at(1).is_empty());
        assert_eq!(at(2), vec![6, 18]);
        assert_eq!(at(7), vec![6, 22, 38]);
        assert_eq!(at(32), vec![6, 34, 60, 86, 112, 138]);
        assert_eq!(at(40), vec![6, 30, 58, 86, 114, 142, 170]);
    }

    #[test]
    fn test_alignment_centers_skip_finders() {
        let qr = QrCode::encode_text_advanced(
            "1",
            QrCodeEcc::Low,
            Version::new(7),
            Version::MAX,
            None,
            false,
        )
        .unwrap();
        let centers = qr.alignment_centers();
        assert_eq!(centers.len(), 6);
        assert!(!centers.contains(&(6, 6)));
        assert!(!centers.contains(&(38, 6)));
        assert!(!centers.contains(&(6, 38)));
        for &(x, y) in &centers {
            assert!(qr.get_module(i32::from(x), i32::from(y)));
            assert!(!qr.get_module(i32::from(x) + 1, i32::from(y)));
            assert!(qr.get_module(i32::from(x) + 2, i32::from(y)));
        }
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let a = QrCode::encode_text("https://example.com", QrCodeEcc::Quartile).unwrap();
        let b = QrCode::encode_text("https://example.com", QrCodeEcc::Quartile).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_reed_solomon_remainder() {
        let rs = ReedSolomonGenerator::new(10);
        assert_eq!(rs.remainder(&[]), vec![0u8; 10]);
        assert_eq!(rs.remainder(&[0, 0, 0]), vec![0u8; 10]);
        assert_eq!(rs.remainder(&[1]).len(), 10);
        assert_eq!(ReedSolomonGenerator::multiply(0x80, 0x02), 0x1d);
    }

    #[test]
    fn test_bit_buffer_packing() {
        let mut bb = BitBuffer::default();
        bb.append_bits(0b1010, 4);
        bb.append_bits(0b0101, 4);
        bb.append_bits(0xff, 8);
        assert_eq!(bb.to_bytes(), vec![0xa5, 0xff]);
    }
}
