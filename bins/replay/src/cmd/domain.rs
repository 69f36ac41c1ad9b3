use serde_json::{json, Map, Value};

// ═══════════════════════════════════════════════════════════════
//  Emitter
// ═══════════════════════════════════════════════════════════════

const SCAN_TYPES: [&str; 4] = ["circular", "sector", "conical", "track"];

/// Класс излучателя: диапазон частот и типичные параметры импульса.
struct Profile {
    class: &'static str,
    freq_mhz: (f64, f64),
    prf_hz: (u64, u64),
    pw_us: (f64, f64),
}

static PROFILES: [Profile; 4] = [
    Profile { class: "nav", freq_mhz: (9300.0, 9500.0), prf_hz: (800, 3000), pw_us: (0.05, 1.2) },
    Profile { class: "surveillance", freq_mhz: (2700.0, 3100.0), prf_hz: (300, 1200), pw_us: (0.8, 3.0) },
    Profile { class: "fire_control", freq_mhz: (8500.0, 10500.0), prf_hz: (2000, 8000), pw_us: (0.1, 0.5) },
    Profile { class: "weather", freq_mhz: (5600.0, 5650.0), prf_hz: (250, 1300), pw_us: (0.8, 2.0) },
];

/// Один наблюдаемый излучатель. Параметры дрейфуют от такта к такту.
pub struct Emitter {
    pub track_id: String,
    profile: &'static Profile,
    scan_type: &'static str,
    freq_mhz: f64,
    prf_hz: u64,
    pw_us: f64,
    amplitude_db: f64,
    bearing_deg: f64,
}

impl Emitter {
    pub fn tick(&mut self, rng: &mut Rng) {
        let (lo, hi) = self.profile.freq_mhz;
        self.freq_mhz = (self.freq_mhz + rng.signed() * 0.5).clamp(lo, hi);
        self.amplitude_db = (self.amplitude_db + rng.signed() * 1.5).clamp(-95.0, -20.0);
        self.bearing_deg = (self.bearing_deg + rng.signed() * 0.8).rem_euclid(360.0);
    }

    /// Документ трека. Изредка амплитуда не измерена и приходит `null`.
    pub fn to_record(&self, rng: &mut Rng, tofa_utc: String, position: &Platform) -> Map<String, Value> {
        let amplitude = if rng.next_intn(20) == 0 {
            Value::Null
        } else {
            json!(round(self.amplitude_db, 1))
        };
        let record = json!({
            "track_id": self.track_id,
            "freq_mhz": round(self.freq_mhz, 1),
            "prf_hz": self.prf_hz,
            "pw_us": round(self.pw_us, 2),
            "amplitude_db": amplitude,
            "scan_type": self.scan_type,
            "tofa_utc": tofa_utc,
            "own_position": {
                "latitude_degdec": round(position.latitude, 6),
                "longitude_degdec": round(position.longitude, 6),
            },
            "emitter_class": self.profile.class,
            "bearing_deg": round(self.bearing_deg, 1),
            "signal": { "snr_db": round(rng.next_f64() * 30.0 + 5.0, 1) },
        });
        match record {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }
}

pub fn new_emitters(rng: &mut Rng, count: usize) -> Vec<Emitter> {
    (0..count)
        .map(|i| {
            let profile = &PROFILES[rng.next_intn(PROFILES.len())];
            let (flo, fhi) = profile.freq_mhz;
            let (plo, phi) = profile.prf_hz;
            let (wlo, whi) = profile.pw_us;
            Emitter {
                track_id: format!("EM-{:03}", i + 1),
                profile,
                scan_type: SCAN_TYPES[rng.next_intn(SCAN_TYPES.len())],
                freq_mhz: flo + rng.next_f64() * (fhi - flo),
                prf_hz: plo + rng.next_intn((phi - plo) as usize) as u64,
                pw_us: wlo + rng.next_f64() * (whi - wlo),
                amplitude_db: -80.0 + rng.next_f64() * 40.0,
                bearing_deg: rng.next_f64() * 360.0,
            }
        })
        .collect()
}

// ═══════════════════════════════════════════════════════════════
//  Platform: собственное положение приёмника
// ═══════════════════════════════════════════════════════════════

pub struct Platform {
    pub latitude: f64,
    pub longitude: f64,
    heading_deg: f64,
}

impl Platform {
    pub fn new(rng: &mut Rng) -> Self {
        Self {
            latitude: 59.5 + rng.next_f64(),
            longitude: 24.0 + rng.next_f64() * 4.0,
            heading_deg: rng.next_f64() * 360.0,
        }
    }

    /// Сдвиг на `step_m` метров по курсу с лёгким рысканием.
    pub fn advance(&mut self, rng: &mut Rng, step_m: f64) {
        self.heading_deg = (self.heading_deg + rng.signed() * 2.0).rem_euclid(360.0);
        let heading = self.heading_deg.to_radians();
        self.latitude += step_m * heading.cos() / 111_320.0;
        self.longitude += step_m * heading.sin() / (111_320.0 * self.latitude.to_radians().cos());
    }
}

fn round(v: f64, digits: i32) -> f64 {
    let k = 10f64.powi(digits);
    (v * k).round() / k
}

// ═══════════════════════════════════════════════════════════════
//  RNG (xorshift64)
// ═══════════════════════════════════════════════════════════════

pub struct Rng {
    state: u64,
}

impl Rng {
    /// `seed == 0`: засеять от часов.
    pub fn new(seed: u64) -> Self {
        let state = if seed == 0 {
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos() as u64
                | 1
        } else {
            seed
        };
        Self { state }
    }

    fn next_u64(&mut self) -> u64 {
        self.state ^= self.state << 13;
        self.state ^= self.state >> 7;
        self.state ^= self.state << 17;
        self.state
    }

    /// [0, 1)
    pub fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / ((1u64 << 53) as f64)
    }

    /// [-1, 1)
    fn signed(&mut self) -> f64 {
        self.next_f64() * 2.0 - 1.0
    }

    pub fn next_intn(&mut self, n: usize) -> usize {
        if n == 0 {
            return 0;
        }
        (self.next_u64() % n as u64) as usize
    }
}
