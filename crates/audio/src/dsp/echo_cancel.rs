//! Echo Cancellation (AEC) mit MDF-Filter
//!
//! [`MdfState`] ist ein adaptiver Multi-Delay-Block-Filter im
//! Frequenzbereich: M Bloecke der Laenge 2*n schaetzen aus dem
//! Fernsignal (was gerade abgespielt wurde) das Echo im Mikrofonsignal und
//! ziehen es ab. Alle Konstanten sind abgestimmte Werte und bleiben exakt
//! so stehen.
//!
//! [`EchoCanceller`] legt davor einen DC-Entferner, der immer laeuft, und
//! synchronisiert Wiedergabe und Aufnahme ueber einen Referenz-Ring-Buffer.
//! Ist die Echo-Unterdrueckung aus, wird der Filterzustand freigegeben und
//! das Signal passiert nur den DC-Entferner.

use realfft::num_complex::Complex;
use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};
use std::sync::Arc;
use tracing::{debug, trace};

use crate::error::{AudioError, AudioResult};
use crate::ringbuffer::RingBuffer;

type Spektrum = Vec<Complex<f32>>;

/// Groesse des Referenz-Ring-Buffers in Bytes
pub const REFERENZ_RING_BYTES: usize = 8192;
/// Standard-Filterlaenge in Samples
pub const STANDARD_ECHO_LAENGE: usize = 4096;

// ---------------------------------------------------------------------------
// FFT-Hilfen
// ---------------------------------------------------------------------------

struct Fft {
    forward: Arc<dyn RealToComplex<f32>>,
    inverse: Arc<dyn ComplexToReal<f32>>,
    zeit: Vec<f32>,
    frequenz: Spektrum,
    skalierung: f32,
}

impl Fft {
    fn new(n: usize) -> Self {
        let mut planner = RealFftPlanner::<f32>::new();
        let forward = planner.plan_fft_forward(n);
        let inverse = planner.plan_fft_inverse(n);
        Self {
            zeit: forward.make_input_vec(),
            frequenz: forward.make_output_vec(),
            forward,
            inverse,
            skalierung: 1.0 / n as f32,
        }
    }

    /// Zeitbereich -> Spektrum (unnormiert)
    fn vorwaerts(&mut self, input: &[f32], out: &mut [Complex<f32>]) -> AudioResult<()> {
        self.zeit.copy_from_slice(input);
        self.forward
            .process(&mut self.zeit, out)
            .map_err(|e| AudioError::Dsp(e.to_string()))
    }

    /// Spektrum -> Zeitbereich, mit 1/N skaliert
    fn rueckwaerts(&mut self, input: &[Complex<f32>], out: &mut [f32]) -> AudioResult<()> {
        self.frequenz.copy_from_slice(input);
        // DC und Nyquist sind bei reellen Signalen rein reell
        self.frequenz[0].im = 0.0;
        if let Some(nyquist) = self.frequenz.last_mut() {
            nyquist.im = 0.0;
        }
        self.inverse
            .process(&mut self.frequenz, out)
            .map_err(|e| AudioError::Dsp(e.to_string()))?;
        for s in out.iter_mut() {
            *s *= self.skalierung;
        }
        Ok(())
    }
}

fn inner_prod(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn power_spectrum(spec: &[Complex<f32>], ps: &mut [f32]) {
    for (p, c) in ps.iter_mut().zip(spec) {
        *p = c.norm_sqr();
    }
}

fn spectral_mul_accum(x: &[Complex<f32>], w: &[Complex<f32>], acc: &mut [Complex<f32>]) {
    for ((a, xv), wv) in acc.iter_mut().zip(x).zip(w) {
        *a += *xv * *wv;
    }
}

// ---------------------------------------------------------------------------
// MDF
// ---------------------------------------------------------------------------

/// Zustand des adaptiven MDF-Filters
pub struct MdfState {
    frame_size: usize,
    window_size: usize,
    m: usize,
    cancel_count: u32,
    adapted: bool,
    adapt_rate: f32,
    sum_adapt: f32,
    sey: f32,
    syy: f32,
    see: f32,

    fft: Fft,
    x: Vec<f32>,
    d: Vec<f32>,
    y: Vec<f32>,
    y2: Vec<f32>,
    e: Vec<f32>,
    last_y: Vec<f32>,
    yps: Vec<f32>,
    hanning: Vec<f32>,

    /// Fernsignal-Spektren, neuester Block zuletzt
    x_spec: Vec<Spektrum>,
    w: Vec<Spektrum>,
    phi: Vec<Spektrum>,
    y_spec: Spektrum,
    y2_spec: Spektrum,
    d_spec: Spektrum,
    e_spec: Spektrum,
    yps_spec: Spektrum,
    w_zeit: Vec<f32>,

    yf: Vec<f32>,
    rf: Vec<f32>,
    xf: Vec<f32>,
    fratio: Vec<f32>,
    power: Vec<f32>,
    power_1: Vec<f32>,
    regul: Vec<f32>,
}

impl MdfState {
    /// Erstellt einen Filter fuer `frame_size` Samples pro Aufruf und
    /// `filter_length` Samples Echo-Laenge
    pub fn new(frame_size: usize, filter_length: usize) -> AudioResult<Self> {
        if frame_size == 0 {
            return Err(AudioError::Dsp("Rahmengroesse 0".into()));
        }
        let n = frame_size;
        let big_n = 2 * n;
        let m = ((filter_length + n - 1) / n).max(1);
        let bins = n + 1;
        let mf = m as f32;

        let regul = (0..bins)
            .map(|k| {
                if k == 0 {
                    (0.01 + 10.0 / (4.0 * 4.0)) / mf
                } else {
                    let j = k as f32;
                    0.01 + (10.0 / ((j + 4.0) * (j + 4.0))) / mf
                }
            })
            .collect();

        let hanning = (0..big_n)
            .map(|i| 0.5 - 0.5 * (2.0 * std::f32::consts::PI * i as f32 / big_n as f32).cos())
            .collect();

        let spektrum = || vec![Complex::new(0.0f32, 0.0); bins];

        debug!(frame_size, filter_length, bloecke = m, "MDF-Echofilter erstellt");

        Ok(Self {
            frame_size: n,
            window_size: big_n,
            m,
            cancel_count: 0,
            adapted: false,
            adapt_rate: 0.01,
            sum_adapt: 0.0,
            sey: 0.0,
            syy: 0.0,
            see: 0.0,
            fft: Fft::new(big_n),
            x: vec![0.0; big_n],
            d: vec![0.0; big_n],
            y: vec![0.0; big_n],
            y2: vec![0.0; big_n],
            e: vec![0.0; big_n],
            last_y: vec![0.0; big_n],
            yps: vec![0.0; big_n],
            hanning,
            x_spec: (0..m).map(|_| spektrum()).collect(),
            w: (0..m).map(|_| spektrum()).collect(),
            phi: (0..m).map(|_| spektrum()).collect(),
            y_spec: spektrum(),
            y2_spec: spektrum(),
            d_spec: spektrum(),
            e_spec: spektrum(),
            yps_spec: spektrum(),
            w_zeit: vec![0.0; big_n],
            yf: vec![0.0; bins],
            rf: vec![0.0; bins],
            xf: vec![0.0; bins],
            fratio: vec![0.0; bins],
            power: vec![0.0; bins],
            power_1: vec![0.0; bins],
            regul,
        })
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Anzahl Filterbloecke
    pub fn bloecke(&self) -> usize {
        self.m
    }

    pub fn is_adapted(&self) -> bool {
        self.adapted
    }

    /// `true` solange alle Filtergewichte null sind
    pub fn ist_leer(&self) -> bool {
        self.w
            .iter()
            .flatten()
            .all(|c| c.re == 0.0 && c.im == 0.0)
    }

    /// Setzt den adaptiven Zustand auf null zurueck
    pub fn reset(&mut self) {
        let null = Complex::new(0.0, 0.0);
        self.cancel_count = 0;
        for block in self.w.iter_mut().chain(self.x_spec.iter_mut()) {
            block.iter_mut().for_each(|c| *c = null);
        }
        self.power.iter_mut().for_each(|p| *p = 0.0);
        self.adapted = false;
        self.adapt_rate = 0.01;
        self.sum_adapt = 0.0;
        self.sey = 0.0;
        self.syy = 0.0;
        self.see = 0.0;
    }

    /// Entfernt das Echo von `far` aus `near` und schreibt das Ergebnis
    /// nach `out`. Mit `yout` wird das Leistungsspektrum des Restechos
    /// (n+1 Werte) fuer einen nachgeschalteten Postfilter geliefert.
    pub fn cancel(
        &mut self,
        near: &[i16],
        far: &[i16],
        out: &mut [i16],
        yout: Option<&mut [f32]>,
    ) -> AudioResult<()> {
        let n = self.frame_size;
        let big_n = self.window_size;
        let m = self.m;
        if near.len() != n || far.len() != n || out.len() != n {
            return Err(AudioError::Dsp(format!(
                "Rahmen muessen {} Samples lang sein",
                n
            )));
        }
        if yout.as_ref().is_some_and(|y| y.len() < n + 1) {
            return Err(AudioError::Dsp("Restecho-Puffer zu klein".into()));
        }

        let leak_estimate = 0.1 + 0.9 / (1.0 + 2.0 * self.sum_adapt);
        self.cancel_count += 1;

        // Eingaenge in die Verlaufspuffer schieben
        self.x.copy_within(n.., 0);
        self.d.copy_within(n.., 0);
        for i in 0..n {
            self.x[n + i] = far[i] as f32;
            self.d[n + i] = near[i] as f32;
        }

        // Neuester Fernsignal-Block ans Ende
        self.x_spec.rotate_left(1);
        self.fft.vorwaerts(&self.x, &mut self.x_spec[m - 1])?;

        // Echo-Schaetzung Y
        self.y_spec.iter_mut().for_each(|c| *c = Complex::new(0.0, 0.0));
        for j in 0..m {
            spectral_mul_accum(&self.x_spec[j], &self.w[j], &mut self.y_spec);
        }
        self.fft.rueckwaerts(&self.y_spec, &mut self.y)?;

        self.fft.vorwaerts(&self.d, &mut self.d_spec)?;

        // Fehlersignal
        for i in 0..n {
            let tmp_out = near[i] as f32 - self.y[n + i];
            self.e[i] = 0.0;
            self.e[n + i] = tmp_out;
            out[i] = tmp_out.clamp(-32768.0, 32767.0) as i16;
        }

        // Projektion des letzten Gradienten fuer schnellere Adaption
        {
            let syy = inner_prod(&self.y[n..], &self.y[n..]);
            self.y2_spec
                .iter_mut()
                .for_each(|c| *c = Complex::new(0.0, 0.0));
            for j in 0..m {
                spectral_mul_accum(&self.x_spec[j], &self.phi[j], &mut self.y2_spec);
            }
            self.fft.rueckwaerts(&self.y2_spec, &mut self.y2)?;
            let sge = inner_prod(&self.y2[n..], &self.e[n..]);
            let sgg = inner_prod(&self.y2[n..], &self.y2[n..]);

            let gain = (sge / (big_n as f32 + 0.03 * syy + sgg)).clamp(-2.0, 2.0);

            for (y, y2) in self.y_spec.iter_mut().zip(&self.y2_spec) {
                *y += *y2 * gain;
            }
            for i in n..big_n {
                self.y[i] += gain * self.y2[i];
                self.e[i] -= gain * self.y2[i];
            }
            for (wb, pb) in self.w.iter_mut().zip(&self.phi) {
                for (w, p) in wb.iter_mut().zip(pb) {
                    *w += *p * gain;
                }
            }
        }

        // Leistungsspektren von Ausgang (D-Y) und Echo-Schaetzung (Y)
        for (d, y) in self.d_spec.iter_mut().zip(&self.y_spec) {
            *d -= *y;
        }
        power_spectrum(&self.d_spec, &mut self.rf);
        power_spectrum(&self.y_spec, &mut self.yf);

        for j in 0..=n {
            self.fratio[j] = (leak_estimate * self.yf[j] / (1.0 + self.rf[j])).min(1.0);
        }

        let sey = inner_prod(&self.y[n..], &self.e[n..]);
        let see = inner_prod(&self.e[n..], &self.e[n..]);
        let syy = inner_prod(&self.y[n..], &self.y[n..]);
        let srr = inner_prod(&self.d[n..], &self.d[n..]);
        let sxx = inner_prod(&self.x[n..], &self.x[n..]);

        self.sey = 0.98 * self.sey + 0.02 * sey;
        self.syy = 0.98 * self.syy + 0.02 * syy;
        self.see = 0.98 * self.see + 0.02 * see;

        // Filter voellig falsch adaptiert: zuruecksetzen
        if self.sey / (1.0 + self.syy + 0.01 * self.see) < -1.0 {
            trace!(cancel_count = self.cancel_count, "MDF-Filter divergiert, Reset");
            self.reset();
            return Ok(());
        }

        let ser = srr / (1.0 + sxx);
        let esr = (leak_estimate * syy / (1.0 + see)).min(1.0);

        // Ueberkompensation (Echo mit 180 Grad Phase): daempfen
        if self.sey / (1.0 + self.syy) < -0.1 && esr > 0.3 {
            self.gewichte_skalieren(0.95);
            self.sey *= 0.5;
        }
        // Unterkompensation: hochskalieren
        if self.sey / (1.0 + self.syy) > 0.1 && (esr > 0.1 || ser < 10.0) {
            self.gewichte_skalieren(1.05);
            self.sey *= 0.5;
        }

        if esr > 0.6 && self.sum_adapt > 1.0 {
            self.adapted = true;
        }

        for r in self.fratio.iter_mut() {
            *r = 0.2 * esr + 0.8 * (0.005 + esr).min(*r);
        }

        let mf = m as f32;
        self.adapt_rate = if self.adapted {
            0.95 / (2.0 + mf)
        } else if ser < 0.1 {
            0.8 / (2.0 + mf)
        } else if ser < 1.0 {
            0.4 / (2.0 + mf)
        } else if ser < 10.0 {
            0.2 / (2.0 + mf)
        } else if ser < 30.0 {
            0.08 / (2.0 + mf)
        } else {
            0.0
        };
        self.sum_adapt += self.adapt_rate;

        // Echoleistung pro Bin
        {
            let ss = (1.0 / self.cancel_count as f32).max(0.3 / mf);
            power_spectrum(&self.x_spec[m - 1], &mut self.xf);
            for j in 0..=n {
                self.power[j] = (1.0 - ss) * self.power[j] + ss * self.xf[j];
            }
            for i in 0..=n {
                self.power_1[i] = if self.adapted {
                    self.adapt_rate * self.fratio[i] / (1.0 + self.power[i])
                } else {
                    self.adapt_rate / (1.0 + self.power[i])
                };
            }
        }

        self.fft.vorwaerts(&self.e, &mut self.e_spec)?;

        // Regularisierung
        for wb in self.w.iter_mut() {
            for (w, r) in wb.iter_mut().zip(&self.regul) {
                *w *= 1.0 - r * esr;
            }
        }

        // Gradient und Abstieg
        for j in 0..m {
            for i in 0..=n {
                let grad = self.x_spec[j][i].conj() * self.e_spec[i] * self.power_1[i];
                self.phi[j][i] = grad;
                self.w[j][i] += grad;
            }
        }

        // AUMDF: pro Aufruf einen Block auf kausale Laenge beschraenken
        let j = self.cancel_count as usize % m;
        self.fft.rueckwaerts(&self.w[j], &mut self.w_zeit)?;
        self.w_zeit[n..].iter_mut().for_each(|s| *s = 0.0);
        self.fft.vorwaerts(&self.w_zeit, &mut self.w[j])?;

        if let Some(yout) = yout {
            if self.adapted {
                self.last_y.copy_within(n.., 0);
                self.last_y[n..].copy_from_slice(&self.y[n..]);
            } else {
                self.last_y.copy_from_slice(&self.x);
            }
            for i in 0..big_n {
                self.yps[i] = self.hanning[i] * self.last_y[i];
            }
            self.fft.vorwaerts(&self.yps, &mut self.yps_spec)?;
            for (ziel, c) in yout.iter_mut().zip(&self.yps_spec) {
                *ziel = 2.0 * leak_estimate * c.norm_sqr();
            }
        }

        Ok(())
    }

    fn gewichte_skalieren(&mut self, faktor: f32) {
        for w in self.w.iter_mut().flatten() {
            *w *= faktor;
        }
    }
}

// ---------------------------------------------------------------------------
// Wrapper mit DC-Entferner und Referenz-Synchronisation
// ---------------------------------------------------------------------------

/// Echo-Canceller der Aufnahme-Pipeline
pub struct EchoCanceller {
    bias: i64,
    tail: usize,
    mdf: Option<MdfState>,
    referenz: Option<RingBuffer>,
    verzoegert: Vec<i16>,
    ergebnis: Vec<i16>,
}

impl EchoCanceller {
    pub fn new(tail: usize) -> Self {
        Self {
            bias: 0,
            tail,
            mdf: None,
            referenz: None,
            verzoegert: Vec::new(),
            ergebnis: Vec::new(),
        }
    }

    /// Merkt abgespielte Samples als Echo-Referenz (nur wenn aktiv)
    pub fn playback(&mut self, samples: &[i16]) {
        if let Some(referenz) = self.referenz.as_mut() {
            referenz.write_samples(samples);
        }
    }

    /// Entfernt DC-Anteil und, wenn `enabled`, das Echo aus `frame`
    pub fn cancel(&mut self, frame: &mut [i16], enabled: bool) -> AudioResult<()> {
        for s in frame.iter_mut() {
            self.bias += (((*s as i64) << 15) - self.bias) >> 14;
            let wert = *s as i64 - (self.bias >> 15);
            *s = wert.clamp(i16::MIN as i64, i16::MAX as i64) as i16;
        }

        if !enabled {
            if self.mdf.take().is_some() {
                debug!("Echo-Unterdrueckung aus, Filter freigegeben");
            }
            self.referenz = None;
            return Ok(());
        }

        let n = frame.len();
        if n == 0 {
            return Ok(());
        }
        if self.mdf.as_ref().map(|m| m.frame_size()) != Some(n) {
            self.mdf = Some(MdfState::new(n, self.tail)?);
            self.referenz = Some(RingBuffer::new(REFERENZ_RING_BYTES)?);
        }

        let (Some(mdf), Some(referenz)) = (self.mdf.as_mut(), self.referenz.as_mut()) else {
            return Ok(());
        };

        // Erst wenn zwei Rahmen Referenz vorliegen
        if referenz.read_available() < (n + mdf.frame_size()) * 2 {
            return Ok(());
        }
        self.verzoegert.resize(n, 0);
        referenz.read_samples(&mut self.verzoegert);

        self.ergebnis.resize(n, 0);
        mdf.cancel(frame, &self.verzoegert, &mut self.ergebnis, None)?;
        frame.copy_from_slice(&self.ergebnis);
        Ok(())
    }

    /// `true` wenn kein adaptiver Zustand existiert oder er null ist
    pub fn ist_filter_leer(&self) -> bool {
        self.mdf.as_ref().map_or(true, MdfState::ist_leer)
    }

    pub fn ist_aktiv(&self) -> bool {
        self.mdf.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Lcg(u32);

    impl Lcg {
        fn naechstes(&mut self) -> i16 {
            self.0 = self.0.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            ((self.0 >> 16) as i16) / 4
        }
    }

    fn energie(s: &[i16]) -> f64 {
        s.iter().map(|&x| (x as f64) * (x as f64)).sum()
    }

    #[test]
    fn mdf_konvergiert_auf_kausales_echo() {
        let n = 160;
        let mut mdf = MdfState::new(n, 1024).unwrap();
        let mut rng = Lcg(12345);
        let echo_pfad = [(8usize, 0.5f32), (30, -0.25), (70, 0.1)];
        let mut verlauf = vec![0i16; 128];

        let mut near_energie = 0.0;
        let mut rest_energie = 0.0;
        for rahmen in 0..300 {
            let far: Vec<i16> = (0..n).map(|_| rng.naechstes()).collect();
            let mut near = vec![0i16; n];
            for i in 0..n {
                verlauf.rotate_left(1);
                let letzter = verlauf.len() - 1;
                verlauf[letzter] = far[i];
                let mut wert = 0.0f32;
                for &(verzoegerung, gain) in &echo_pfad {
                    wert += gain * verlauf[letzter - verzoegerung] as f32;
                }
                near[i] = wert as i16;
            }
            let mut out = vec![0i16; n];
            mdf.cancel(&near, &far, &mut out, None).unwrap();
            if rahmen >= 250 {
                near_energie += energie(&near);
                rest_energie += energie(&out);
            }
        }
        assert!(
            rest_energie < 0.25 * near_energie,
            "Restecho zu gross: {rest_energie} vs {near_energie}"
        );
        assert!(!mdf.ist_leer());
    }

    #[test]
    fn mdf_falsche_rahmenlaenge() {
        let mut mdf = MdfState::new(160, 4096).unwrap();
        let mut out = vec![0i16; 80];
        assert!(mdf.cancel(&[0; 80], &[0; 80], &mut out, None).is_err());
        assert_eq!(mdf.bloecke(), 26);
    }

    #[test]
    fn mdf_reset_leert_filter() {
        let mut mdf = MdfState::new(64, 256).unwrap();
        let mut rng = Lcg(7);
        for _ in 0..20 {
            let far: Vec<i16> = (0..64).map(|_| rng.naechstes()).collect();
            let near: Vec<i16> = far.iter().map(|s| s / 2).collect();
            let mut out = vec![0i16; 64];
            mdf.cancel(&near, &far, &mut out, None).unwrap();
        }
        assert!(!mdf.ist_leer());
        mdf.reset();
        assert!(mdf.ist_leer());
        assert!(!mdf.is_adapted());
    }

    #[test]
    fn mdf_setzt_sich_bei_umgekehrtem_echopfad_zurueck() {
        let n = 64;
        let mut mdf = MdfState::new(n, 256).unwrap();
        let mut rng = Lcg(7);
        let mut out = vec![0i16; n];

        for _ in 0..300 {
            let far: Vec<i16> = (0..n).map(|_| rng.naechstes()).collect();
            let near: Vec<i16> = far.iter().map(|s| s / 2).collect();
            mdf.cancel(&near, &far, &mut out, None).unwrap();
        }
        assert!(!mdf.ist_leer());

        let mut resets = 0;
        for _ in 0..300 {
            let far: Vec<i16> = (0..n).map(|_| rng.naechstes()).collect();
            let near: Vec<i16> = far.iter().map(|s| -(s / 2)).collect();
            mdf.cancel(&near, &far, &mut out, None).unwrap();
            if mdf.ist_leer() {
                resets += 1;
            }
        }
        assert!(resets >= 1, "kein Reset nach Umkehr des Echopfads");
    }

    #[test]
    fn mdf_restecho_spektrum() {
        let mut mdf = MdfState::new(32, 64).unwrap();
        let far = vec![1000i16; 32];
        let mut out = vec![0i16; 32];
        let mut yout = vec![0.0f32; 33];
        mdf.cancel(&far, &far, &mut out, Some(&mut yout)).unwrap();
        assert!(yout.iter().all(|v| v.is_finite() && *v >= 0.0));
        assert!(yout[0] > 0.0);
    }

    #[test]
    fn bypass_nur_dc_entferner() {
        let mut ec = EchoCanceller::new(STANDARD_ECHO_LAENGE);
        let mut rng = Lcg(99);

        // Referenz-DC-Entferner parallel nachrechnen
        let mut bias: i64 = 0;
        for _ in 0..10 {
            let far: Vec<i16> = (0..160).map(|_| rng.naechstes()).collect();
            ec.playback(&far);
            let original: Vec<i16> = (0..160).map(|_| rng.naechstes().wrapping_add(300)).collect();
            let erwartet: Vec<i16> = original
                .iter()
                .map(|&s| {
                    bias += (((s as i64) << 15) - bias) >> 14;
                    (s as i64 - (bias >> 15)) as i16
                })
                .collect();
            let mut frame = original.clone();
            ec.cancel(&mut frame, false).unwrap();
            assert_eq!(frame, erwartet);
            assert!(ec.ist_filter_leer());
            assert!(!ec.ist_aktiv());
        }
    }

    #[test]
    fn dc_anteil_wird_entfernt() {
        let mut ec = EchoCanceller::new(STANDARD_ECHO_LAENGE);
        let mut frame = vec![1000i16; 160];
        for _ in 0..800 {
            frame.fill(1000);
            ec.cancel(&mut frame, false).unwrap();
        }
        assert!(frame.iter().all(|s| s.abs() < 20), "{:?}", &frame[..4]);
    }

    #[test]
    fn ausschalten_gibt_filter_frei() {
        let mut ec = EchoCanceller::new(1024);
        let mut rng = Lcg(3);
        for _ in 0..10 {
            let far: Vec<i16> = (0..160).map(|_| rng.naechstes()).collect();
            let mut near: Vec<i16> = far.iter().map(|s| s / 2).collect();
            ec.cancel(&mut near, true).unwrap();
            ec.playback(&far);
        }
        assert!(ec.ist_aktiv());
        assert!(!ec.ist_filter_leer());

        let mut frame = vec![0i16; 160];
        ec.cancel(&mut frame, false).unwrap();
        assert!(!ec.ist_aktiv());
        assert!(ec.ist_filter_leer());
    }

    #[test]
    fn wartet_auf_genug_referenz() {
        let mut ec = EchoCanceller::new(1024);
        let mut frame = vec![500i16; 160];
        ec.cancel(&mut frame, true).unwrap();
        // Ohne Referenz bleibt es beim DC-Entferner
        assert!(ec.ist_filter_leer());
        ec.playback(&[0; 160]);
        let mut frame = vec![500i16; 160];
        ec.cancel(&mut frame, true).unwrap();
        assert!(ec.ist_filter_leer());
    }
}
