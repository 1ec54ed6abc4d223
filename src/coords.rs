/// Position or displacement in the scan field, in mm
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point
{
    pub x: f64,
    pub y: f64
}

impl Point
{
    pub fn new(x: f64, y: f64) -> Point
    {
        Point{x, y}
    }

    pub fn length(&self) -> f64
    {
        (self.x*self.x + self.y*self.y).sqrt()
    }

    /// Counter-clockwise quarter turn
    pub fn rotated_90(&self) -> Point
    {
        Point{x: -self.y, y: self.x}
    }

    pub fn lerp(&self, p: Point, t: f64) -> Point
    {
        Point{x: self.x + (p.x - self.x) * t,
              y: self.y + (p.y - self.y) * t}
    }
}

impl From<(f64, f64)> for Point
{
    fn from((x, y): (f64, f64)) -> Point
    {
        Point{x, y}
    }
}

impl From<Point> for (f64, f64)
{
    fn from(p: Point) -> (f64, f64)
    {
        (p.x, p.y)
    }
}

impl std::ops::Add<Point> for Point {
    type Output = Point;
    fn add(self, v: Point) -> Point {
        Point { x: self.x + v.x,
                y: self.y + v.y}
    }
}

impl std::ops::Sub<Point> for Point {
    type Output = Point;
    fn sub(self, v: Point) -> Point {
        Point { x: self.x - v.x,
                y: self.y - v.y}
    }
}

impl std::ops::Mul<f64> for Point {
    type Output = Point;
    fn mul(self, s: f64) -> Point {
        Point { x: self.x * s,
                y: self.y * s}
    }
}

#[test]
fn test_point_ops()
{
    let a = Point::new(3.0, 4.0);
    assert_eq!(a.length(), 5.0);
    assert_eq!(a.rotated_90(), Point::new(-4.0, 3.0));
    assert_eq!(a + Point::new(1.0, -1.0), Point::new(4.0, 3.0));
    assert_eq!(a.lerp(Point::new(5.0, 8.0), 0.5), Point::new(4.0, 6.0));
    assert_eq!(Point::from((1.5, 2.5)), Point::new(1.5, 2.5));
    assert_eq!(<(f64, f64)>::from(a), (3.0, 4.0));
}
