use crate::error::{Result, guard};
use crate::node::{Item, StatelessOp};
use crate::node_id::StepId;
use crate::stream::StreamData;
use crate::window::TimestampMs;
use std::marker::PhantomData;

pub(crate) struct FilterOp<T, F>(pub F, pub PhantomData<fn(T)>);

impl<T, F> StatelessOp for FilterOp<T, F>
where
    T: StreamData,
    F: Fn(&T) -> bool + Send + Sync + 'static,
{
    fn apply(&self, step: &StepId, item: Item, out: &mut Vec<Item>) -> Result<()> {
        let keep = {
            let value = item.peek::<T>(step)?;
            guard(step.as_str(), value, || (self.0)(value))?
        };
        if keep {
            out.push(item);
        }
        Ok(())
    }
}

pub(crate) struct FilterMapOp<I, O, F>(pub F, pub PhantomData<fn(I) -> O>);

impl<I, O, F> StatelessOp for FilterMapOp<I, O, F>
where
    I: StreamData,
    O: StreamData,
    F: Fn(&I) -> Option<O> + Send + Sync + 'static,
{
    fn apply(&self, step: &StepId, item: Item, out: &mut Vec<Item>) -> Result<()> {
        let (epoch, value) = item.take::<I>(step)?;
        if let Some(o) = guard(step.as_str(), &value, || (self.0)(&value))? {
            out.push(Item::new(epoch, o));
        }
        Ok(())
    }
}

pub(crate) struct FlatMapOp<I, O, It, F>(pub F, pub PhantomData<fn(I) -> (O, It)>);

impl<I, O, It, F> StatelessOp for FlatMapOp<I, O, It, F>
where
    I: StreamData,
    O: StreamData,
    It: IntoIterator<Item = O>,
    F: Fn(&I) -> It + Send + Sync + 'static,
{
    fn apply(&self, step: &StepId, item: Item, out: &mut Vec<Item>) -> Result<()> {
        let (epoch, value) = item.take::<I>(step)?;
        // Drained inside the guard: iterators may panic while being consumed.
        let produced: Vec<O> =
            guard(step.as_str(), &value, || (self.0)(&value).into_iter().collect())?;
        out.extend(produced.into_iter().map(|o| Item::new(epoch, o)));
        Ok(())
    }
}

pub(crate) struct MapOp<I, O, F>(pub F, pub PhantomData<fn(I) -> O>);

impl<I, O, F> StatelessOp for MapOp<I, O, F>
where
    I: StreamData,
    O: StreamData,
    F: Fn(&I) -> O + Send + Sync + 'static,
{
    fn apply(&self, step: &StepId, item: Item, out: &mut Vec<Item>) -> Result<()> {
        let (epoch, value) = item.take::<I>(step)?;
        let o = guard(step.as_str(), &value, || (self.0)(&value))?;
        out.push(Item::new(epoch, o));
        Ok(())
    }
}

pub(crate) struct InspectOp<T, F>(pub F, pub PhantomData<fn(T)>);

impl<T, F> StatelessOp for InspectOp<T, F>
where
    T: StreamData,
    F: Fn(&T) + Send + Sync + 'static,
{
    fn apply(&self, step: &StepId, item: Item, out: &mut Vec<Item>) -> Result<()> {
        {
            let value = item.peek::<T>(step)?;
            guard(step.as_str(), value, || (self.0)(value))?;
        }
        out.push(item);
        Ok(())
    }
}

pub(crate) struct InspectEpochOp<T, F>(pub F, pub PhantomData<fn(T)>);

impl<T, F> StatelessOp for InspectEpochOp<T, F>
where
    T: StreamData,
    F: Fn(TimestampMs, &T) + Send + Sync + 'static,
{
    fn apply(&self, step: &StepId, item: Item, out: &mut Vec<Item>) -> Result<()> {
        {
            let value = item.peek::<T>(step)?;
            guard(step.as_str(), value, || (self.0)(item.epoch, value))?;
        }
        out.push(item);
        Ok(())
    }
}
