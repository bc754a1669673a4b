// src/gps/satellites.rs
//! Satellites in view, aggregated across talker systems

use super::data::{GnssSystem, SatelliteRecord};

/// Per-system satellite lists, in the order systems were first reported.
///
/// A system's list is only ever replaced as a whole.
#[derive(Debug, Clone, Default)]
pub struct SatelliteTable {
    systems: Vec<(GnssSystem, Vec<SatelliteRecord>)>,
}

impl SatelliteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically replace one system's list.
    pub fn replace_system(&mut self, system: GnssSystem, records: Vec<SatelliteRecord>) {
        match self.systems.iter_mut().find(|(s, _)| *s == system) {
            Some((_, existing)) => *existing = records,
            None => self.systems.push((system, records)),
        }
    }

    /// All satellites across every system, in insertion order.
    pub fn flatten(&self) -> impl Iterator<Item = &SatelliteRecord> + '_ {
        self.systems.iter().flat_map(|(_, records)| records.iter())
    }

    pub fn system(&self, system: GnssSystem) -> Option<&[SatelliteRecord]> {
        self.systems
            .iter()
            .find(|(s, _)| *s == system)
            .map(|(_, records)| records.as_slice())
    }
}

/// Collects the parts of multi-sentence GSV sweeps until they are complete.
#[derive(Debug, Clone, Default)]
pub struct SweepAssembler {
    pending: Vec<PendingSweep>,
}

#[derive(Debug, Clone)]
struct PendingSweep {
    system: GnssSystem,
    parts: u8,
    next_part: u8,
    records: Vec<SatelliteRecord>,
}

impl SweepAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one part of a sweep; returns the full list once part N of N arrives.
    ///
    /// Part 1 always starts over for that system. Parts that arrive out of
    /// sequence abandon the unfinished sweep.
    pub fn push(
        &mut self,
        system: GnssSystem,
        part: u8,
        parts: u8,
        records: Vec<SatelliteRecord>,
    ) -> Option<Vec<SatelliteRecord>> {
        let slot = self.pending.iter().position(|p| p.system == system);

        if part <= 1 {
            let sweep = PendingSweep {
                system,
                parts,
                next_part: 2,
                records,
            };
            match slot {
                Some(i) => self.pending[i] = sweep,
                None => self.pending.push(sweep),
            }
        } else {
            let i = slot?;
            let sweep = &mut self.pending[i];
            if sweep.next_part != part || sweep.parts != parts {
                self.pending.remove(i);
                return None;
            }
            sweep.records.extend(records);
            sweep.next_part += 1;
        }

        let i = self.pending.iter().position(|p| p.system == system)?;
        if part >= self.pending[i].parts {
            return Some(self.pending.remove(i).records);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sat(prn: u16, system: GnssSystem) -> SatelliteRecord {
        SatelliteRecord {
            prn,
            elevation: 45,
            azimuth: 100,
            snr: 30,
            system,
        }
    }

    fn prns(table: &SatelliteTable) -> Vec<u16> {
        table.flatten().map(|s| s.prn).collect()
    }

    #[test]
    fn test_replace_is_per_system() {
        let mut table = SatelliteTable::new();
        table.replace_system(GnssSystem::Gps, vec![sat(1, GnssSystem::Gps), sat(2, GnssSystem::Gps)]);
        table.replace_system(GnssSystem::Glonass, vec![sat(65, GnssSystem::Glonass)]);
        assert_eq!(prns(&table), vec![1, 2, 65]);

        table.replace_system(GnssSystem::Gps, vec![sat(7, GnssSystem::Gps)]);
        assert_eq!(prns(&table), vec![7, 65]);
        assert_eq!(table.flatten().count(), 2);
    }

    #[test]
    fn test_sweep_completes_on_last_part() {
        let mut sweeps = SweepAssembler::new();
        let gps = GnssSystem::Gps;

        assert_eq!(sweeps.push(gps, 1, 3, vec![sat(1, gps), sat(2, gps)]), None);
        assert_eq!(sweeps.push(gps, 2, 3, vec![sat(3, gps)]), None);
        let done = sweeps.push(gps, 3, 3, vec![sat(4, gps)]).unwrap();

        assert_eq!(done.iter().map(|s| s.prn).collect::<Vec<_>>(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_restart_discards_unfinished_sweep() {
        let mut sweeps = SweepAssembler::new();
        let gps = GnssSystem::Gps;

        sweeps.push(gps, 1, 2, vec![sat(1, gps)]);
        sweeps.push(gps, 1, 2, vec![sat(9, gps)]);
        let done = sweeps.push(gps, 2, 2, vec![sat(10, gps)]).unwrap();

        assert_eq!(done.iter().map(|s| s.prn).collect::<Vec<_>>(), vec![9, 10]);
    }

    #[test]
    fn test_interleaved_systems_do_not_mix() {
        let mut sweeps = SweepAssembler::new();
        let (gps, glo) = (GnssSystem::Gps, GnssSystem::Glonass);

        sweeps.push(gps, 1, 2, vec![sat(1, gps)]);
        assert_eq!(sweeps.push(glo, 1, 1, vec![sat(65, glo)]).unwrap().len(), 1);
        let done = sweeps.push(gps, 2, 2, vec![sat(2, gps)]).unwrap();
        assert!(done.iter().all(|s| s.system == gps));
    }

    #[test]
    fn test_orphan_continuation_is_ignored() {
        let mut sweeps = SweepAssembler::new();
        let gps = GnssSystem::Gps;
        assert_eq!(sweeps.push(gps, 2, 2, vec![sat(3, gps)]), None);

        sweeps.push(gps, 1, 3, vec![sat(1, gps)]);
        // Part 3 without part 2
        assert_eq!(sweeps.push(gps, 3, 3, vec![sat(5, gps)]), None);
        assert_eq!(sweeps.push(gps, 2, 3, vec![sat(2, gps)]), None);
    }
}
